// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

use thiserror::Error;

use crate::scrub::Category;

/// Failures inside the extraction and anonymisation engines.  None of these
/// escape to the user directly: each engine recovers locally (fall back to
/// the original text, or to the pattern-based rewrite).
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("unexpected end of fragment, {open} element(s) still open")]
    Truncated { open: usize },

    #[error("closing tag </{0}> without a matching opening tag")]
    UnbalancedEnd(String),

    #[error("failed to write XML: {0}")]
    Write(String),

    #[error("fragment is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Raised by a [`crate::scrub::ValueGenerator`] that cannot produce a value.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no synthetic values available for {0}")]
    Exhausted(Category),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}
