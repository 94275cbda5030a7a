// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::Event;

/// Indent width used for emitted fragments.
pub const INDENT: usize = 2;

/// Re-serialise `xml` with two-space indentation.  Several top-level
/// elements are fine; anything that is not well formed comes back as the
/// trimmed original.
pub fn pretty_print(xml: &str) -> String {
    match reindent(xml) {
        Some(pretty) if !pretty.trim().is_empty() => pretty,
        _ => xml.trim().to_string(),
    }
}

fn reindent(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = true;
    let mut writer = Writer::new_with_indent(Vec::with_capacity(xml.len()), b' ', INDENT);
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().ok()?;
        match event {
            Event::Eof => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.checked_sub(1)?,
            _ => {}
        }
        writer.write_event(event).ok()?;
    }

    if depth != 0 {
        return None;
    }
    String::from_utf8(writer.into_inner()).ok()
}
