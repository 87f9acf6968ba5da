// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Minimal vCard handling needed to store cards.
//!
//! Cards are treated as opaque text. The only inspections are UID
//! extraction/assignment and the mandatory-property check done before a
//! card is uploaded.

use crate::error::CardDavError;

/// Unfolds the content lines of a vCard (RFC 6350 3.2).
fn content_lines(card: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in card.lines() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match (raw.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(last)) => last.push_str(continuation),
            _ if raw.is_empty() => {}
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

/// Splits a content line into its upper-cased property name and its value.
fn split_line(line: &str) -> Option<(String, &str)> {
    let (head, value) = line.split_once(':')?;
    let name = head.split(';').next().unwrap_or(head);
    // Group prefix, e.g. `item1.EMAIL`.
    let name = name.rsplit('.').next().unwrap_or(name);
    Some((name.to_ascii_uppercase(), value))
}

fn property<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| match split_line(line) {
        Some((n, value)) if n == name => Some(value),
        _ => None,
    })
}

/// Returns the UID of the card, if any.
#[must_use]
pub fn uid(card: &str) -> Option<String> {
    let lines = content_lines(card);
    property(&lines, "UID")
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string)
}

/// Returns the card with a UID, generating one if absent, and the UID.
///
/// A generated UID is inserted right after the `VERSION` line, or after
/// `BEGIN:VCARD` if there is none, keeping the card's line endings.
#[must_use]
pub fn ensure_uid(card: &str) -> (String, String) {
    if let Some(uid) = uid(card) {
        return (card.to_string(), uid);
    }

    let uid = uuid::Uuid::new_v4().to_string();
    let eol = if card.contains("\r\n") { "\r\n" } else { "\n" };
    let uid_line = format!("UID:{uid}{eol}");

    let anchor = ["VERSION:", "BEGIN:VCARD"]
        .iter()
        .find_map(|prefix| line_end_after(card, prefix));

    let card = match anchor {
        Some(pos) => {
            let (head, tail) = card.split_at(pos);
            format!("{head}{uid_line}{tail}")
        }
        None => format!("{uid_line}{card}"),
    };
    (card, uid)
}

/// Byte offset right after the line starting with `prefix`.
fn line_end_after(card: &str, prefix: &str) -> Option<usize> {
    let mut offset = 0;
    for line in card.split_inclusive('\n') {
        let next = offset + line.len();
        if line
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return Some(next);
        }
        offset = next;
    }
    None
}

/// Checks that the card carries the properties every vCard must have.
///
/// # Errors
///
/// Returns [`CardDavError::Validation`] naming the first missing part.
pub fn validate(card: &str) -> Result<(), CardDavError> {
    let lines = content_lines(card);
    let is = |line: Option<&String>, expected: &str| {
        line.is_some_and(|l| l.trim().eq_ignore_ascii_case(expected))
    };

    if !is(lines.first(), "BEGIN:VCARD") {
        return Err(CardDavError::Validation("missing BEGIN:VCARD".to_string()));
    }
    if !is(lines.last(), "END:VCARD") {
        return Err(CardDavError::Validation("missing END:VCARD".to_string()));
    }

    let version = property(&lines, "VERSION")
        .map(str::trim)
        .ok_or_else(|| CardDavError::Validation("missing VERSION".to_string()))?;

    // vCard 2.1 requires N, later versions FN.
    let required = if version == "2.1" { "N" } else { "FN" };
    if property(&lines, required).is_none() {
        return Err(CardDavError::Validation(format!("missing {required}")));
    }
    if uid(card).is_none() {
        return Err(CardDavError::Validation("missing UID".to_string()));
    }
    Ok(())
}

/// Derives a resource file name from a UID.
///
/// Characters outside `[A-Za-z0-9._-]` are dropped; a random name is used
/// if nothing is left. `suffix` is appended before the extension.
#[must_use]
pub fn file_name(uid: &str, suffix: Option<&str>) -> String {
    let mut base: String = uid
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if base.trim_matches('.').is_empty() {
        base = uuid::Uuid::new_v4().to_string();
    }
    match suffix {
        Some(suffix) => format!("{base}-{suffix}.vcf"),
        None => format!("{base}.vcf"),
    }
}
