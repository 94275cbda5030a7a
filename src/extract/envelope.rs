// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Per-envelope operations: namespace filtering, header scrubbing and body
//! extraction.  Parsing goes through roxmltree; anything that fails to parse
//! is treated as "no match" rather than an error.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use roxmltree::Document;
use std::borrow::Cow;

/// SOAP 1.1 envelope namespace, the default for body extraction.
pub const SOAP11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Left between the Header tags once the payload is gone.
pub const HEADER_REDACTED: &str = "<!-- HEADER REDACTED -->";

/// `<x:Header attrs>payload</x:Header>`.  Attribute values may contain `/`
/// (namespace URIs) but a bare `/` before `>` means a self-closed header,
/// which has nothing to redact and must not swallow the rest of the envelope.
static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)(<(?:[\w.-]+:)?Header(?:\s(?:"[^"]*"|'[^']*'|[^>"'/])*)?>)(.*?)(</(?:[\w.-]+:)?Header\s*>)"#,
    )
    .expect("valid regex")
});

/// How a target namespace is matched against an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamespaceMatch {
    /// Literal substring anywhere in the raw block.  Tolerant of prefixes and
    /// broken XML, at the cost of matching coincidental text.
    #[default]
    Substring,
    /// The block must parse and bind some element, attribute or declaration
    /// to exactly this URI.
    Structural,
}

/// Whether `block` belongs to `target` under the chosen matching rule.
pub fn matches_namespace(block: &str, target: &str, mode: NamespaceMatch) -> bool {
    match mode {
        NamespaceMatch::Substring => block.contains(target),
        NamespaceMatch::Structural => match Document::parse(block) {
            Ok(doc) => doc.descendants().filter(|n| n.is_element()).any(|node| {
                node.tag_name().namespace() == Some(target)
                    || node.namespaces().any(|ns| ns.uri() == target)
                    || node.attributes().any(|a| a.namespace() == Some(target))
            }),
            Err(err) => {
                tracing::debug!(error = %err, "structural namespace check on unparsable block");
                false
            }
        },
    }
}

/// Keep the Header tags but replace everything between them.
pub fn scrub_header(envelope: &str) -> Cow<'_, str> {
    HEADER_PATTERN.replace_all(envelope, |caps: &Captures| {
        format!("{}\n  {HEADER_REDACTED}\n{}", &caps[1], &caps[3])
    })
}

/// Source text of the Body's child elements, concatenated in order, without
/// the Body wrapper.  `None` when the envelope does not parse, has no Body in
/// `soap_namespace`, or the Body holds no elements.
pub fn extract_body(envelope: &str, soap_namespace: &str) -> Option<String> {
    let doc = match Document::parse(envelope) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::debug!(error = %err, "skipping envelope that does not parse");
            return None;
        }
    };
    let body = doc
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name((soap_namespace, "Body")))?;

    let inner: String = body
        .children()
        .filter(|child| child.is_element())
        .map(|child| &envelope[child.range()])
        .collect();

    if inner.trim().is_empty() {
        None
    } else {
        Some(inner)
    }
}
