// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Leaf-level PII rewriting for XML fragments.
//!
//! Two strategies share one cache:
//! * the tree rewrite streams the fragment through quick-xml, buffering each
//!   element until it either gains a child (not a leaf, flush it untouched)
//!   or closes (a leaf, maybe substitute its text);
//! * the pattern rewrite works on raw text and only touches
//!   `<p:Tag>value</p:Tag>` runs, for fragments that never parse cleanly
//!   (log prefixes, no single root, truncated bodies).
//!
//! The tree rewrite falls back to the pattern rewrite whenever the fragment
//! is not well formed, so malformed input is never an error.

use crate::error::ScrubError;
use crate::scrub::{CategoryResolver, SyntheticCache, ValueGenerator, tags};
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Element run with matching tags and only text or a single CDATA section in
/// between.  Groups: open name, attributes, CDATA content, text, close name.
/// The regex crate has no back-references, so tag equality is checked in code.
static LEAF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"<([\w.-]+(?::[\w.-]+)?)(\s[^<>]*)?>(?:<!\[CDATA\[((?s:.*?))\]\]>|([^<]*))</([\w.-]+(?::[\w.-]+)?)\s*>",
    )
    .expect("valid regex")
});

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Which rewrite the engine tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnonymizeMode {
    /// Parse as XML, fall back to patterns when that fails.
    #[default]
    Tree,
    /// Patterns only.
    Text,
}

/// An element that has not seen a child element yet.  Its start tag and
/// content are held back until we know whether it is a leaf.
struct PendingLeaf {
    start: BytesStart<'static>,
    content: Vec<Event<'static>>,
}

/// The anonymisation engine: synonym table, value cache and generator.
pub struct Anonymizer {
    resolver: CategoryResolver,
    cache: SyntheticCache,
    generator: Box<dyn ValueGenerator>,
    mode: AnonymizeMode,
    substitutions: AtomicUsize,
}

impl Anonymizer {
    pub fn new(resolver: CategoryResolver, generator: Box<dyn ValueGenerator>) -> Self {
        Self {
            resolver,
            cache: SyntheticCache::new(),
            generator,
            mode: AnonymizeMode::default(),
            substitutions: AtomicUsize::new(0),
        }
    }

    pub fn with_mode(mut self, mode: AnonymizeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Rewrite every PII leaf in `fragment`.  Never fails: text that cannot
    /// be parsed is handled by the pattern rewrite, which leaves anything it
    /// does not recognise exactly as it was.
    pub fn anonymize(&self, fragment: &str) -> String {
        if self.mode == AnonymizeMode::Text {
            return self.anonymize_text(fragment);
        }
        match self.anonymize_tree(fragment) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                tracing::debug!(error = %err, "fragment not well formed, using pattern rewrite");
                self.anonymize_text(fragment)
            }
        }
    }

    /// Event-stream rewrite.  Structure, attributes, prefixes, comments and
    /// processing instructions are written back as read; only the text of
    /// matched leaves changes.
    pub fn anonymize_tree(&self, fragment: &str) -> Result<String, ScrubError> {
        let mut reader = Reader::from_str(fragment);
        reader.config_mut().check_end_names = true;
        let mut writer = Writer::new(Vec::with_capacity(fragment.len()));
        let mut open: Vec<Option<PendingLeaf>> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|err| ScrubError::Malformed {
                position: reader.buffer_position() as u64,
                message: err.to_string(),
            })?;

            match event {
                Event::Start(start) => {
                    flush_parent(&mut open, &mut writer)?;
                    open.push(Some(PendingLeaf {
                        start: start.into_owned(),
                        content: Vec::new(),
                    }));
                }
                Event::End(end) => match open.pop() {
                    Some(Some(leaf)) => self.finish_leaf(leaf, end, &mut writer)?,
                    Some(None) => write_event(&mut writer, Event::End(end))?,
                    None => {
                        let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                        return Err(ScrubError::UnbalancedEnd(name));
                    }
                },
                Event::Empty(empty) => {
                    flush_parent(&mut open, &mut writer)?;
                    write_event(&mut writer, Event::Empty(empty))?;
                }
                Event::Eof => break,
                other => match open.last_mut().and_then(Option::as_mut) {
                    Some(leaf) => leaf.content.push(other.into_owned()),
                    None => write_event(&mut writer, other)?,
                },
            }
        }

        if !open.is_empty() {
            return Err(ScrubError::Truncated { open: open.len() });
        }
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Pattern rewrite.  Only `<p:Tag ...>value</p:Tag>` runs (the value may be
    /// a CDATA section) whose prefixes agree and whose names match
    /// case-insensitively are considered; everything else in the text is
    /// copied through untouched.
    pub fn anonymize_text(&self, text: &str) -> String {
        LEAF_PATTERN
            .replace_all(text, |caps: &Captures| self.rewrite_run(caps))
            .into_owned()
    }

    fn rewrite_run(&self, caps: &Captures) -> String {
        let whole = &caps[0];
        let (open, close) = (&caps[1], &caps[5]);
        if tags::prefix(open) != tags::prefix(close)
            || !tags::local_name(open).eq_ignore_ascii_case(tags::local_name(close))
        {
            return whole.to_string();
        }
        // `<Tag/>` followed by text is not a leaf.
        if caps
            .get(2)
            .is_some_and(|attrs| attrs.as_str().trim_end().ends_with('/'))
        {
            return whole.to_string();
        }

        let (real, span) = match (caps.get(3), caps.get(4)) {
            (Some(cdata), _) => (
                Cow::Borrowed(cdata.as_str()),
                cdata.start() - CDATA_OPEN.len()..cdata.end() + CDATA_CLOSE.len(),
            ),
            (None, Some(text)) => {
                let raw = text.as_str();
                (unescape(raw).unwrap_or(Cow::Borrowed(raw)), text.range())
            }
            (None, None) => return whole.to_string(),
        };
        let Some(synthetic) = self.substitute(tags::local_name(open), &real) else {
            return whole.to_string();
        };

        let base = caps.get(0).map_or(0, |m| m.start());
        let (from, to) = (span.start - base, span.end - base);
        format!("{}{}{}", &whole[..from], escape(synthetic.as_str()), &whole[to..])
    }

    /// Close a buffered leaf: substitute its text if the tag is a known PII
    /// field, otherwise write it back verbatim.
    fn finish_leaf(
        &self,
        leaf: PendingLeaf,
        end: BytesEnd<'_>,
        writer: &mut Writer<Vec<u8>>,
    ) -> Result<(), ScrubError> {
        let mut text = String::new();
        for event in &leaf.content {
            match event {
                Event::Text(t) => match t.unescape() {
                    Ok(unescaped) => text.push_str(&unescaped),
                    Err(_) => text.push_str(&String::from_utf8_lossy(t)),
                },
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(c)),
                _ => {}
            }
        }

        let qualified = String::from_utf8_lossy(leaf.start.name().as_ref()).into_owned();
        let synthetic = self.substitute(tags::local_name(&qualified), &text);

        write_event(writer, Event::Start(leaf.start))?;
        match synthetic {
            Some(value) => {
                write_event(writer, Event::Text(BytesText::new(&value)))?;
                for event in leaf.content {
                    if !matches!(event, Event::Text(_) | Event::CData(_)) {
                        write_event(writer, event)?;
                    }
                }
            }
            None => {
                for event in leaf.content {
                    write_event(writer, event)?;
                }
            }
        }
        write_event(writer, Event::End(end))
    }

    /// Synthetic replacement for a leaf, or `None` when the tag is not a PII
    /// field or the leaf holds only whitespace.
    fn substitute(&self, local_name: &str, real: &str) -> Option<String> {
        if real.trim().is_empty() {
            return None;
        }
        let category = self.resolver.resolve(local_name)?;
        let value = self
            .cache
            .get_or_create(category, real, self.generator.as_ref());
        self.substitutions.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Leaves rewritten so far.
    pub fn substitutions(&self) -> usize {
        self.substitutions.load(Ordering::Relaxed)
    }

    /// Distinct real values mapped so far.
    pub fn mapped_values(&self) -> usize {
        self.cache.len()
    }
}

/// A new child element means the parent is not a leaf: write out whatever
/// was held back for it.
fn flush_parent(
    open: &mut [Option<PendingLeaf>],
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), ScrubError> {
    if let Some(slot) = open.last_mut()
        && let Some(parent) = slot.take()
    {
        write_event(writer, Event::Start(parent.start))?;
        for event in parent.content {
            write_event(writer, event)?;
        }
    }
    Ok(())
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ScrubError> {
    writer
        .write_event(event)
        .map_err(|err| ScrubError::Write(err.to_string()))
}
