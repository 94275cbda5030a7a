// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Tag name normalisation.  Log fragments mix `soapenv:`, `ns2:`, default
//! namespaces and Clark notation (`{uri}Local`), so everything that looks a
//! tag up by name goes through here first.

/// Strip a Clark-notation namespace or a colon prefix, keeping the case of the
/// local part.  Anything without decoration is returned as-is.
pub fn local_name(tag: &str) -> &str {
    if let Some(rest) = tag.strip_prefix('{')
        && let Some(idx) = rest.find('}')
    {
        return &rest[idx + 1..];
    }
    match tag.rfind(':') {
        Some(idx) => &tag[idx + 1..],
        None => tag,
    }
}

/// The colon prefix of a qualified tag (`ns2` for `ns2:Street`), if any.
/// Clark notation has no prefix.
pub fn prefix(tag: &str) -> Option<&str> {
    if tag.starts_with('{') {
        return None;
    }
    tag.rfind(':').map(|idx| &tag[..idx])
}
