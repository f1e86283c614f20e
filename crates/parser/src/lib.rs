//! HVML Parser: tokenizing markup interleaved with eJSON
//!
//! - `reader`: rewindable character stream
//! - `token`: the token contract handed to the VDOM builder
//! - `tags`: operation-tag and raw-attribute-tag tables
//! - `charref`: character-reference decoding
//! - `tokenizer`: the state machine itself

pub mod charref;
pub mod reader;
pub mod tags;
pub mod token;
pub mod tokenizer;

pub use reader::CharReader;
pub use token::{AttrValue, Attribute, Token};
pub use tokenizer::Tokenizer;

use hvml_core::errors;
use std::sync::Once;

static PARSER_INIT: Once = Once::new();

static EJSON_ERR_MSGS: &[&str] = &[
    "Unexpected character",
    "Unexpected null character",
    "Unexpected number exponent",
    "Unexpected number fraction",
    "Unexpected number integer",
    "Unexpected number",
    "Unexpected right brace",
    "Unexpected right bracket",
    "Unexpected key name",
    "Unexpected comma",
    "Unexpected keyword",
    "Unexpected end of input",
    "Bad number",
    "Bad string escape entity",
    "Bad variable name",
    "Maximum nesting depth exceeded",
];

static HVML_ERR_MSGS: &[&str] = &[
    "Unexpected null character",
    "End of input before tag name",
    "Missing end tag name",
    "Invalid first character of tag name",
    "End of input in tag",
    "Unexpected equals sign before attribute name",
    "Unexpected character in attribute name",
    "Unexpected character in unquoted attribute value",
    "Missing whitespace between attributes",
    "Unexpected solidus in tag",
    "Incorrectly opened comment",
    "Abrupt closing of empty comment",
    "End of input in comment",
    "Nested comment",
    "Incorrectly closed comment",
    "End of input in doctype",
    "Missing whitespace before doctype name",
    "Missing doctype name",
    "Invalid character sequence after doctype name",
    "Missing quote before doctype public identifier",
    "Abrupt doctype public identifier",
    "Missing quote before doctype system identifier",
    "Missing doctype system identifier",
    "Abrupt doctype system identifier",
    "Unexpected character after doctype system identifier",
    "Unknown named character reference",
    "Absence of digits in numeric character reference",
    "Missing semicolon after character reference",
    "Character reference outside Unicode range",
    "Surrogate character reference",
    "Noncharacter character reference",
    "Null character reference",
    "Control character reference",
    "Missing attribute value",
    "Unexpected character",
    "Invalid UTF-8 character",
];

/// Register this crate's error-message segments. Idempotent.
pub fn init_once() {
    PARSER_INIT.call_once(|| {
        hvml_variant::init_once();
        errors::register_error_messages(errors::ErrorSegment {
            first: errors::FIRST_EJSON,
            last: errors::FIRST_EJSON + EJSON_ERR_MSGS.len() as i32 - 1,
            messages: EJSON_ERR_MSGS,
        })
        .expect("ejson error segment registers once");
        errors::register_error_messages(errors::ErrorSegment {
            first: errors::FIRST_HVML,
            last: errors::FIRST_HVML + HVML_ERR_MSGS.len() as i32 - 1,
            messages: HVML_ERR_MSGS,
        })
        .expect("hvml error segment registers once");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_segments_register_and_resolve() {
        init_once();
        assert_eq!(
            errors::message_for(errors::EJSON_MAX_DEPTH_EXCEEDED),
            Some("Maximum nesting depth exceeded")
        );
        assert_eq!(
            errors::message_for(errors::HVML_SURROGATE_CHARACTER_REFERENCE),
            Some("Surrogate character reference")
        );
        // Idempotent.
        init_once();
    }
}
