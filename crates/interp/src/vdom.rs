//! Minimal VDOM node surface
//!
//! VDOM construction is the parser consumer's job; the interpreter only
//! needs the node shape frames point at: a named element with attribute
//! payloads (literal or VCM) and children. The builder here assembles that
//! shape from a token stream for hosts and tests.

use hvml_parser::token::{AttrValue, Attribute, Token};
use hvml_parser::{Tokenizer, tags};
use hvml_variant::{ScopeStack, Variant, VcmNode, vcm};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct VdomElement {
    pub name: String,
    pub is_operation: bool,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Arc<VdomElement>>,
}

impl VdomElement {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_operation = tags::is_operation_tag(&name);
        VdomElement {
            name,
            is_operation,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Option<AttrValue>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value,
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Bare `silently` attribute suppresses error reporting for the frame.
    pub fn is_silently(&self) -> bool {
        self.attribute("silently").is_some()
    }

    /// Evaluate one attribute against a scope stack: literals pass through
    /// as strings, VCM payloads evaluate.
    pub fn eval_attribute(
        &self,
        name: &str,
        stack: &ScopeStack,
        silently: bool,
    ) -> Option<Variant> {
        match &self.attribute(name)?.value {
            None => Some(Variant::boolean(true)),
            Some(AttrValue::Literal(text)) => Some(Variant::string(text.clone())),
            Some(AttrValue::Vcm(node)) => vcm::eval(node, stack, silently).ok(),
        }
    }
}

/// Assemble a VDOM tree from HVML source. Stray end tags and text outside
/// any element are dropped; the synthetic root is named "hvml" unless the
/// source opens one itself.
pub fn build_vdom(source: &str) -> Arc<VdomElement> {
    let mut tokenizer = Tokenizer::new(source);
    let mut stack: Vec<VdomElement> = vec![VdomElement::new("hvml")];

    loop {
        match tokenizer.next_token() {
            Token::StartTag {
                name,
                attributes,
                self_closing,
                is_operation,
                ..
            } => {
                if stack.len() == 1 && name == "hvml" {
                    stack[0].attributes = attributes;
                    continue;
                }
                let el = VdomElement {
                    name,
                    is_operation,
                    attributes,
                    children: Vec::new(),
                };
                if self_closing {
                    let parent = stack.last_mut().expect("root never pops");
                    parent.children.push(Arc::new(el));
                } else {
                    stack.push(el);
                }
            }
            Token::EndTag { name } => {
                if stack.len() > 1 && stack.last().map(|e| e.name == name).unwrap_or(false) {
                    let el = stack.pop().expect("guarded by len");
                    let parent = stack.last_mut().expect("root never pops");
                    parent.children.push(Arc::new(el));
                } else {
                    tracing::debug!(name, "dropping unmatched end tag");
                }
            }
            Token::Text(node) => {
                // Whitespace-only literals between elements carry nothing.
                let keep = !matches!(
                    &node,
                    VcmNode::Literal(v)
                        if v.as_str().map(|s| s.trim().is_empty()).unwrap_or(false)
                );
                if keep && stack.len() > 1 {
                    let parent = stack.last_mut().expect("root never pops");
                    parent
                        .children
                        .push(Arc::new(VdomElement::new("#text").with_attribute(
                            "content",
                            Some(AttrValue::Vcm(node)),
                        )));
                }
            }
            Token::Comment(_) | Token::Doctype { .. } | Token::CharacterReference(_) => {}
            Token::Eof => break,
        }
    }

    // Fold unclosed elements back into their parents.
    while stack.len() > 1 {
        let el = stack.pop().expect("guarded by len");
        let parent = stack.last_mut().expect("root never pops");
        parent.children.push(Arc::new(el));
    }
    Arc::new(stack.pop().expect("the root"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_tree() {
        let root = build_vdom("<hvml><body><init as=\"x\"/></body></hvml>");
        assert_eq!(root.name, "hvml");
        assert_eq!(root.children.len(), 1);
        let body = &root.children[0];
        assert_eq!(body.name, "body");
        let init = &body.children[0];
        assert_eq!(init.name, "init");
        assert!(init.is_operation);
    }

    #[test]
    fn test_silently_attribute() {
        let root = build_vdom("<hvml><test silently></test></hvml>");
        let test = &root.children[0];
        assert!(test.is_silently());
    }

    #[test]
    fn test_eval_attribute() {
        let root = build_vdom("<hvml><init as=\"x\" with=\"[1, 2]\"/></hvml>");
        let init = &root.children[0];
        let stack = ScopeStack::new();
        assert_eq!(
            init.eval_attribute("as", &stack, false),
            Some(Variant::string("x"))
        );
        let with = init.eval_attribute("with", &stack, false).unwrap();
        assert_eq!(with.array_size(), Some(2));
    }

    #[test]
    fn test_unmatched_end_tag_dropped() {
        let root = build_vdom("<hvml><body></div></body></hvml>");
        assert_eq!(root.children[0].name, "body");
    }
}
