//! Character references
//!
//! Numeric references are bounded by the Unicode scalar range; nulls,
//! surrogates, noncharacters, and out-of-range values each report their own
//! error while still delivering U+FFFD so tokenization continues. Named
//! references resolve by longest matching prefix over a built-in table.

use hvml_core::errors::{self, ErrorCode};

pub const REPLACEMENT: char = '\u{FFFD}';

/// Named references, sorted by name. Entries without a trailing semicolon
/// are the legacy forms; longest match prefers the semicolon form.
static NAMED_REFS: &[(&str, &str)] = &[
    ("AMP;", "&"),
    ("GT;", ">"),
    ("LT;", "<"),
    ("QUOT;", "\""),
    ("amp", "&"),
    ("amp;", "&"),
    ("apos;", "'"),
    ("copy;", "\u{a9}"),
    ("gt", ">"),
    ("gt;", ">"),
    ("hellip;", "\u{2026}"),
    ("lt", "<"),
    ("lt;", "<"),
    ("mdash;", "\u{2014}"),
    ("nbsp;", "\u{a0}"),
    ("ndash;", "\u{2013}"),
    ("quot", "\""),
    ("quot;", "\""),
    ("times;", "\u{d7}"),
];

/// Does any table entry start with `prefix`?
pub fn any_named_starts_with(prefix: &str) -> bool {
    NAMED_REFS.iter().any(|(name, _)| name.starts_with(prefix))
}

/// Exact lookup of a candidate name.
pub fn named_replacement(name: &str) -> Option<&'static str> {
    NAMED_REFS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, repl)| *repl)
}

fn is_noncharacter(code: u32) -> bool {
    matches!(code, 0xFDD0..=0xFDEF) || (code & 0xFFFE) == 0xFFFE
}

fn is_control_other_than_whitespace(code: u32) -> bool {
    let is_whitespace = matches!(code, 0x09 | 0x0A | 0x0C | 0x0D | 0x20);
    !is_whitespace && (code < 0x20 || (0x7F..=0x9F).contains(&code))
}

/// Validate a numeric reference. Always yields a character; defects also
/// yield their error code so the caller can report and continue.
pub fn check_numeric(code: u32) -> (char, Option<ErrorCode>) {
    if code == 0 {
        return (REPLACEMENT, Some(errors::HVML_NULL_CHARACTER_REFERENCE));
    }
    if code > 0x10FFFF {
        return (
            REPLACEMENT,
            Some(errors::HVML_CHARACTER_REFERENCE_OUTSIDE_UNICODE_RANGE),
        );
    }
    if (0xD800..=0xDFFF).contains(&code) {
        return (REPLACEMENT, Some(errors::HVML_SURROGATE_CHARACTER_REFERENCE));
    }
    if is_noncharacter(code) {
        return (
            REPLACEMENT,
            Some(errors::HVML_NONCHARACTER_CHARACTER_REFERENCE),
        );
    }
    let ch = char::from_u32(code).unwrap_or(REPLACEMENT);
    if is_control_other_than_whitespace(code) {
        return (ch, Some(errors::HVML_CONTROL_CHARACTER_REFERENCE));
    }
    (ch, None)
}
