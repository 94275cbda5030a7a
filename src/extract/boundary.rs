// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Locating SOAP envelopes and bodies in log text.
//!
//! Two granularities: [`find_envelopes`] scans a whole buffer for
//! `<x:Envelope ...>...</x:Envelope>` spans, while [`BodyScanner`] is a small
//! line-driven state machine used when the log is filtered in place.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;

/// Opening marker to the nearest closing marker.  Lazy, case-insensitive and
/// dot-matches-newline; the regex crate keeps this linear in the input size.
static ENVELOPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:[\w.-]+:)?Envelope(?:\s[^>]*)?>.*?</(?:[\w.-]+:)?Envelope\s*>")
        .expect("valid regex")
});

static XMLNS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"xmlns(?::[\w.-]+)?\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

static BODY_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:[\w.-]+:)?Body[\s>/]").expect("valid regex"));

static BODY_EMPTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:[\w.-]+:)?Body(?:\s[^<>]*)?/>").expect("valid regex")
});

static BODY_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:[\w.-]+:)?Body\s*>").expect("valid regex"));

/// One envelope-delimited span of the scanned text.  Borrowed from the input
/// and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeBlock<'a> {
    raw: &'a str,
    span: Range<usize>,
}

impl<'a> EnvelopeBlock<'a> {
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// Byte offsets of the block within the scanned buffer.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Whether the block parses as a standalone XML document.
    pub fn is_well_formed(&self) -> bool {
        roxmltree::Document::parse(self.raw).is_ok()
    }

    /// Namespace URIs declared anywhere in the block, found textually so
    /// this works on blocks that do not parse.
    pub fn namespaces(&self) -> BTreeSet<&'a str> {
        XMLNS_PATTERN
            .captures_iter(self.raw)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
            .collect()
    }
}

/// All non-overlapping envelope blocks in `text`, in input order.
pub fn find_envelopes(text: &str) -> Vec<EnvelopeBlock<'_>> {
    ENVELOPE_PATTERN
        .find_iter(text)
        .map(|m| EnvelopeBlock {
            raw: m.as_str(),
            span: m.range(),
        })
        .collect()
}

/// Result of feeding one line to a [`BodyScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Line outside any Body block, hand it on untouched.
    Passthrough(String),
    /// Line absorbed into the block being accumulated.
    Pending,
    /// A Body block just closed; holds every line from open to close.
    Block(String),
}

#[derive(Debug, Default)]
enum ScanState {
    #[default]
    Outside,
    InsideBody {
        block: String,
        depth: usize,
    },
}

/// Line-oriented Body tracker.  Counts nested Body markers so a business
/// element that happens to be called `Body` does not end the block early.
#[derive(Debug, Default)]
pub struct BodyScanner {
    state: ScanState,
}

impl BodyScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next line (including its line ending, if any).
    pub fn feed(&mut self, line: &str) -> ScanEvent {
        let opens = count_opens(line);
        let closes = BODY_CLOSE.find_iter(line).count();

        match std::mem::take(&mut self.state) {
            ScanState::Outside => {
                if opens == 0 {
                    return ScanEvent::Passthrough(line.to_string());
                }
                if closes >= opens {
                    return ScanEvent::Block(line.to_string());
                }
                self.state = ScanState::InsideBody {
                    block: line.to_string(),
                    depth: opens - closes,
                };
                ScanEvent::Pending
            }
            ScanState::InsideBody { mut block, depth } => {
                block.push_str(line);
                let depth = (depth + opens).saturating_sub(closes);
                if depth == 0 {
                    return ScanEvent::Block(block);
                }
                self.state = ScanState::InsideBody { block, depth };
                ScanEvent::Pending
            }
        }
    }

    /// Whatever is still open at end of input.
    pub fn finish(&mut self) -> Option<String> {
        match std::mem::take(&mut self.state) {
            ScanState::Outside => None,
            ScanState::InsideBody { block, .. } => Some(block),
        }
    }

    #[cfg(test)]
    pub fn is_inside(&self) -> bool {
        matches!(self.state, ScanState::InsideBody { .. })
    }
}

/// Body opening markers on a line, ignoring self-closed `<x:Body/>`.
fn count_opens(line: &str) -> usize {
    let opens = BODY_OPEN.find_iter(line).count();
    opens.saturating_sub(BODY_EMPTY.find_iter(line).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "2024-05-01 10:00:00 INFO start\n\
        2024-05-01 10:00:01 DEBUG out: <soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:big=\"http://example.org/ns\">\n\
        <soapenv:Body><big:Ping/></soapenv:Body>\n\
        </soapenv:Envelope> done\n\
        2024-05-01 10:00:02 DEBUG in: <SOAP-ENV:ENVELOPE><SOAP-ENV:Body/></SOAP-ENV:ENVELOPE>\n";

    #[test]
    fn finds_each_envelope_across_lines_and_case() {
        let blocks = find_envelopes(LOG);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].raw().starts_with("<soapenv:Envelope"));
        assert!(blocks[0].raw().ends_with("</soapenv:Envelope>"));
        assert_eq!(blocks[1].raw(), "<SOAP-ENV:ENVELOPE><SOAP-ENV:Body/></SOAP-ENV:ENVELOPE>");
        assert_eq!(&LOG[blocks[1].span()], blocks[1].raw());
    }

    #[test]
    fn block_metadata() {
        let blocks = find_envelopes(LOG);
        assert!(blocks[0].is_well_formed());
        let namespaces = blocks[0].namespaces();
        assert!(namespaces.contains("http://example.org/ns"));
        assert!(namespaces.contains("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(blocks[0].raw().contains("big:Ping"));
        assert!(blocks[1].namespaces().is_empty());
    }

    #[test]
    fn truncated_envelope_is_not_a_block() {
        let text = "<soapenv:Envelope><soapenv:Body><a>1</a>";
        assert!(find_envelopes(text).is_empty());
    }

    #[test]
    fn lazy_match_stops_at_first_close() {
        let text = "<e:Envelope>one</e:Envelope><e:Envelope>two</e:Envelope>";
        let raws: Vec<&str> = find_envelopes(text).iter().map(|b| b.raw()).collect();
        assert_eq!(raws, ["<e:Envelope>one</e:Envelope>", "<e:Envelope>two</e:Envelope>"]);
    }

    #[test]
    fn scanner_passes_outside_lines_and_collects_body() {
        let mut scanner = BodyScanner::new();
        assert_eq!(
            scanner.feed("plain log line\n"),
            ScanEvent::Passthrough("plain log line\n".to_string())
        );
        assert_eq!(scanner.feed("<soapenv:Body>\n"), ScanEvent::Pending);
        assert!(scanner.is_inside());
        assert_eq!(scanner.feed("  <FirstName>Anna</FirstName>\n"), ScanEvent::Pending);
        assert_eq!(
            scanner.feed("</soapenv:Body>\n"),
            ScanEvent::Block("<soapenv:Body>\n  <FirstName>Anna</FirstName>\n</soapenv:Body>\n".to_string())
        );
        assert!(!scanner.is_inside());
        assert_eq!(scanner.finish(), None);
    }

    #[test]
    fn scanner_handles_single_line_and_self_closed_bodies() {
        let mut scanner = BodyScanner::new();
        let line = "x <s:Body><a>1</a></s:Body> y\n";
        assert_eq!(scanner.feed(line), ScanEvent::Block(line.to_string()));
        let empty = "<s:Body/>\n";
        assert_eq!(scanner.feed(empty), ScanEvent::Passthrough(empty.to_string()));
    }

    #[test]
    fn scanner_tracks_nested_body_elements() {
        let mut scanner = BodyScanner::new();
        assert_eq!(scanner.feed("<soapenv:Body>\n"), ScanEvent::Pending);
        assert_eq!(scanner.feed("<msg:Body>\n"), ScanEvent::Pending);
        assert_eq!(scanner.feed("</msg:Body>\n"), ScanEvent::Pending);
        assert!(matches!(scanner.feed("</soapenv:Body>\n"), ScanEvent::Block(_)));
    }

    #[test]
    fn scanner_returns_unterminated_block() {
        let mut scanner = BodyScanner::new();
        scanner.feed("<soapenv:Body>\n");
        scanner.feed("<City>Bonn</City>\n");
        assert_eq!(
            scanner.finish(),
            Some("<soapenv:Body>\n<City>Bonn</City>\n".to_string())
        );
        assert!(!scanner.is_inside());
    }
}
