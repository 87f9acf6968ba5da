// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML utilities for WebDAV/CardDAV processing.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CardDavError;

/// XML namespaces used in `CardDAV`.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CardDAV` namespace.
    pub const CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";

    /// Calendar server extensions, home of `getctag`.
    pub const CALENDARSERVER: &str = "http://calendarserver.org/ns/";
}

/// Appends the character data carried by `event` to `out`.
///
/// Handles plain text, CDATA sections and entity references; other events
/// are ignored.
///
/// # Errors
///
/// Returns an error on invalid UTF-8 or an unknown entity.
pub fn push_text(event: &Event<'_>, out: &mut String) -> Result<(), CardDavError> {
    match event {
        Event::Text(text) => {
            let raw = utf8(text)?;
            let unescaped = quick_xml::escape::unescape(raw)
                .map_err(|e| CardDavError::Xml(format!("Invalid escape: {e}")))?;
            out.push_str(&unescaped);
        }
        Event::CData(data) => out.push_str(utf8(data)?),
        Event::GeneralRef(reference) => out.push(resolve_reference(utf8(reference)?)?),
        _ => {}
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<&str, CardDavError> {
    std::str::from_utf8(bytes).map_err(|e| CardDavError::Xml(format!("UTF-8 error: {e}")))
}

fn resolve_reference(name: &str) -> Result<char, CardDavError> {
    let resolved = match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => name.strip_prefix('#').and_then(|code| {
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse().ok(),
            };
            value.and_then(char::from_u32)
        }),
    };
    resolved.ok_or_else(|| CardDavError::Xml(format!("Unknown entity reference: &{name};")))
}

/// Indented XML writer over an in-memory buffer.
pub type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Creates a writer for a request body.
#[must_use]
pub fn writer() -> XmlWriter {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

/// Writes `<name>text</name>`.
///
/// # Errors
///
/// Returns an error if XML writing fails.
pub fn write_text_element(
    writer: &mut XmlWriter,
    name: &str,
    text: &str,
) -> Result<(), CardDavError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Finishes a writer and returns its content.
///
/// # Errors
///
/// Returns an error if the output is not valid UTF-8.
pub fn finish(writer: XmlWriter) -> Result<String, CardDavError> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| CardDavError::Xml(format!("UTF-8 error: {e}")))
}
