// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Envelope extraction: find SOAP blocks in log text, filter them by
//! namespace, strip headers or unwrap the body, and pretty-print what is
//! left.

pub mod boundary;
pub mod envelope;
pub mod pretty;

pub use boundary::{BodyScanner, EnvelopeBlock, ScanEvent, find_envelopes};
pub use envelope::{NamespaceMatch, SOAP11_NAMESPACE, extract_body, matches_namespace, scrub_header};
pub use pretty::pretty_print;

/// What the extractor keeps and how.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub namespace: Option<String>,
    pub namespace_match: NamespaceMatch,
    pub body_only: bool,
    pub soap_namespace: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            namespace_match: NamespaceMatch::default(),
            body_only: false,
            soap_namespace: SOAP11_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Envelope,
    Body,
}

impl FragmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            FragmentKind::Envelope => "SOAP ENVELOPE",
            FragmentKind::Body => "SOAP BODY",
        }
    }
}

/// One emitted piece of XML with its running sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub index: usize,
    pub kind: FragmentKind,
    pub xml: String,
}

impl Fragment {
    /// Comment line written before the fragment, e.g. `<!-- SOAP BODY #3 -->`.
    pub fn separator(&self) -> String {
        format!("<!-- {} #{} -->", self.kind.label(), self.index)
    }
}

/// How an extraction run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Matched(usize),
    /// A namespace filter was active and nothing passed it.
    NoMatches,
}

/// Stateful extractor.  Sequence numbers keep counting across every buffer
/// handed to [`Extractor::extract`], so several input files share one
/// numbering.
#[derive(Debug)]
pub struct Extractor {
    options: ExtractOptions,
    emitted: usize,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            emitted: 0,
        }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Scan a whole buffer and return every fragment that survives the
    /// configured filters, in input order.
    pub fn extract(&mut self, text: &str) -> Vec<Fragment> {
        let kind = if self.options.body_only {
            FragmentKind::Body
        } else {
            FragmentKind::Envelope
        };
        let mut fragments = Vec::new();
        for block in find_envelopes(text) {
            let Some(xml) = self.process_block(&block) else {
                continue;
            };
            self.emitted += 1;
            fragments.push(Fragment {
                index: self.emitted,
                kind,
                xml,
            });
        }
        fragments
    }

    /// Filter and reshape one envelope.  `None` means the block is dropped.
    pub fn process_block(&self, block: &EnvelopeBlock<'_>) -> Option<String> {
        if let Some(target) = self.options.namespace.as_deref()
            && !matches_namespace(block.raw(), target, self.options.namespace_match)
        {
            return None;
        }

        if !block.is_well_formed() {
            tracing::debug!(
                span = ?block.span(),
                namespaces = ?block.namespaces(),
                "envelope block is not well formed"
            );
        }

        if self.options.body_only {
            let inner = extract_body(block.raw(), &self.options.soap_namespace)?;
            return Some(pretty_print(&inner));
        }
        Some(pretty_print(&scrub_header(block.raw())))
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn outcome(&self) -> ExtractOutcome {
        if self.emitted == 0 && self.options.namespace.is_some() {
            ExtractOutcome::NoMatches
        } else {
            ExtractOutcome::Matched(self.emitted)
        }
    }
}
