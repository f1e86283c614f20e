//! The HVML tag tables
//!
//! Finishing a start tag re-classifies it: operation (verb) tags drive the
//! interpreter's frame ops, and template tags keep their attribute values
//! raw. The C source uses a generated perfect hash; a sorted static table
//! with binary search serves the same O(1)-ish lookup here.

/// Verb tags, sorted for binary search.
static OPERATION_TAGS: &[&str] = &[
    "archedata",
    "archetype",
    "back",
    "bind",
    "call",
    "catch",
    "choose",
    "clear",
    "define",
    "erase",
    "error",
    "except",
    "exit",
    "fire",
    "forget",
    "include",
    "inherit",
    "init",
    "iterate",
    "listen",
    "load",
    "match",
    "observe",
    "reduce",
    "request",
    "return",
    "sleep",
    "sort",
    "test",
    "update",
];

/// Template tags whose attribute values are kept verbatim: no entity
/// decoding, no embedded-expression parsing.
static RAW_ATTR_TAGS: &[&str] = &["archedata", "archetype", "error", "except"];

/// Is `name` an operation (verb) tag? Lookup is case-insensitive.
pub fn is_operation_tag(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    OPERATION_TAGS.binary_search(&lowered.as_str()).is_ok()
}

/// Does `name` suppress entity decoding in its attribute values?
pub fn is_raw_attr_tag(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    RAW_ATTR_TAGS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(OPERATION_TAGS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_operation_lookup() {
        assert!(is_operation_tag("init"));
        assert!(is_operation_tag("OBSERVE"));
        assert!(!is_operation_tag("p"));
        assert!(!is_operation_tag("body"));
    }

    #[test]
    fn test_raw_attr_tags() {
        assert!(is_raw_attr_tag("archetype"));
        assert!(is_raw_attr_tag("ARCHEDATA"));
        assert!(!is_raw_attr_tag("init"));
    }
}
