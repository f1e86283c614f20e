//! Tokens the tokenizer hands to the VDOM builder
//!
//! Text and attribute values carry VCM trees, so the eJSON expressions
//! embedded in markup survive tokenization as structure, not as strings.

use hvml_variant::VcmNode;

/// An attribute value: either plain text or an embedded expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Literal(String),
    Vcm(VcmNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// `None` for bare attributes (`<x checked>`).
    pub value: Option<AttrValue>,
}

/// The token stream's discriminated union.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    StartTag {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
        /// The tag name is in the operation table.
        is_operation: bool,
        /// The tag's attribute values keep their raw text (no entity decode,
        /// no expression parsing).
        has_raw_attr: bool,
    },
    EndTag {
        name: String,
    },
    /// Character data, already folded into a VCM tree.
    Text(VcmNode),
    Comment(String),
    Doctype {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    /// A decoded character reference standing alone; references inside text
    /// and attribute values are folded into their carrier instead.
    CharacterReference(char),
    /// End of input.
    Eof,
}

impl Token {
    /// Text payload as a plain string, when the tree is a bare literal.
    pub fn text_literal(&self) -> Option<&str> {
        match self {
            Token::Text(VcmNode::Literal(v)) => v.as_str(),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Token::Eof)
    }
}
