//! Value Construction Model: expression trees and their evaluator
//!
//! The tokenizer builds these trees for every embedded eJSON expression;
//! tokens carry them as payloads and the interpreter evaluates them each
//! time a frame needs the value. A tree is immutable after construction, so
//! one compile serves many evaluations against different scope stacks.

pub mod ev;

use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};
use std::cell::RefCell;
use std::sync::Arc;

/// One node of a VCM tree. Nodes own their children.
#[derive(Debug, Clone, PartialEq)]
pub enum VcmNode {
    /// Embeds a ready-made variant.
    Literal(Variant),
    /// `$name`, resolved against the scope stack at evaluation time.
    VarRef(String),
    /// `base.member` or `base[member]`.
    GetMember {
        base: Box<VcmNode>,
        member: Box<VcmNode>,
    },
    /// `callee(args...)`; the callee must land on a dynamic or native value.
    Call {
        callee: Box<VcmNode>,
        args: Vec<VcmNode>,
    },
    /// `"a $x b"`: children stringify and concatenate.
    ConcatString(Vec<VcmNode>),
    /// `{ k: v, ... }`.
    ObjectLit(Vec<(VcmNode, VcmNode)>),
    /// `[ v, ... ]`.
    ArrayLit(Vec<VcmNode>),
    /// Thin wrapper whose value is materialized by re-running the stored
    /// subtree.
    ExprVar(Arc<VcmNode>),
}

/// Ordered list of scope objects, most-recent first.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<Variant>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an object variant as the innermost scope.
    pub fn push_scope(&mut self, scope: Variant) {
        debug_assert!(scope.is_object(), "scopes are object variants");
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<Variant> {
        self.scopes.pop()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Walk scopes innermost-out; first match wins.
    pub fn resolve(&self, name: &str) -> Option<Variant> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.object_get_ex(name, true))
    }
}

thread_local! {
    // The scope stack of the coroutine currently executing on this thread;
    // expression variables re-evaluate against it.
    static CURRENT_STACK: RefCell<Option<ScopeStack>> = const { RefCell::new(None) };
}

/// Install (or clear) the scope stack expression variables evaluate against.
pub fn set_current_scope_stack(stack: Option<ScopeStack>) {
    CURRENT_STACK.with(|s| *s.borrow_mut() = stack);
}

/// Run `f` with the current scope stack, if one is installed.
pub fn with_current_scope_stack<R>(f: impl FnOnce(&ScopeStack) -> R) -> Option<R> {
    CURRENT_STACK.with(|s| s.borrow().as_ref().map(f))
}

/// Evaluate a tree against a scope stack.
pub fn eval(node: &VcmNode, stack: &ScopeStack, silently: bool) -> Result<Variant, ErrorCode> {
    match node {
        VcmNode::Literal(v) => Ok(v.clone()),

        VcmNode::VarRef(name) => match stack.resolve(name) {
            Some(v) => Ok(v),
            None => {
                errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                Err(errors::NOT_EXISTS)
            }
        },

        VcmNode::GetMember { base, member } => {
            let base = eval(base, stack, silently)?;
            let key = eval(member, stack, silently)?;
            let value = get_member_raw(&base, &key, silently)?;
            // A dynamic member accessed without arguments evaluates its
            // getter, so `$SYS.time` reads as a value.
            match value {
                Variant::Dynamic { getter, .. } => getter(Some(&base), &[], silently),
                other => Ok(other),
            }
        }

        VcmNode::Call { callee, args } => {
            let arg_values = args
                .iter()
                .map(|a| eval(a, stack, silently))
                .collect::<Result<Vec<_>, _>>()?;
            match callee.as_ref() {
                VcmNode::GetMember { base, member } => {
                    let base = eval(base, stack, silently)?;
                    let key = eval(member, stack, silently)?;
                    if base.is_native() {
                        return base.native_property(
                            key.stringify().as_str(),
                            &arg_values,
                            silently,
                        );
                    }
                    match get_member_raw(&base, &key, silently)? {
                        Variant::Dynamic { getter, .. } => {
                            getter(Some(&base), &arg_values, silently)
                        }
                        _ => {
                            errors::set_last_error_silently(errors::VCM_NOT_CALLABLE, silently);
                            Err(errors::VCM_NOT_CALLABLE)
                        }
                    }
                }
                _ => match eval(callee, stack, silently)? {
                    Variant::Dynamic { getter, .. } => getter(None, &arg_values, silently),
                    _ => {
                        errors::set_last_error_silently(errors::VCM_NOT_CALLABLE, silently);
                        Err(errors::VCM_NOT_CALLABLE)
                    }
                },
            }
        }

        VcmNode::ConcatString(children) => {
            let mut out = String::new();
            for child in children {
                match eval(child, stack, silently) {
                    Ok(v) => out.push_str(&v.stringify()),
                    Err(e) if silently => {
                        tracing::debug!(error = e, "concat child suppressed");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(Variant::string(out))
        }

        VcmNode::ObjectLit(pairs) => {
            let obj = Variant::object();
            for (k, v) in pairs {
                let key = eval(k, stack, silently)?.stringify();
                let value = eval(v, stack, silently)?;
                obj.object_set_ex(key, value, silently)?;
            }
            Ok(obj)
        }

        VcmNode::ArrayLit(items) => {
            let arr = Variant::array();
            for item in items {
                arr.array_append(eval(item, stack, silently)?)?;
            }
            Ok(arr)
        }

        VcmNode::ExprVar(subtree) => eval(subtree, stack, silently),
    }
}

/// Member lookup without auto-invoking dynamic getters.
fn get_member_raw(base: &Variant, key: &Variant, silently: bool) -> Result<Variant, ErrorCode> {
    match base {
        Variant::Object(_) => {
            let name = key.stringify();
            match base.object_get_ex(&name, silently) {
                Some(v) => Ok(v),
                None => {
                    errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                    Err(errors::NOT_EXISTS)
                }
            }
        }
        Variant::Array(_) => {
            let idx = key.cast_to_i64().unwrap_or(-1);
            if idx < 0 {
                errors::set_last_error_silently(errors::INVALID_VALUE, silently);
                return Err(errors::INVALID_VALUE);
            }
            match base.array_get(idx as usize) {
                Some(v) => Ok(v),
                None => {
                    errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                    Err(errors::NOT_EXISTS)
                }
            }
        }
        Variant::Native(_) => base.native_property(key.stringify().as_str(), &[], silently),
        _ => {
            errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
            Err(errors::WRONG_DATA_TYPE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with(entries: &[(&str, Variant)]) -> ScopeStack {
        let obj = Variant::object();
        for (k, v) in entries {
            obj.object_set(*k, v.clone()).unwrap();
        }
        let mut stack = ScopeStack::new();
        stack.push_scope(obj);
        stack
    }

    #[test]
    fn test_literal_clones() {
        let stack = ScopeStack::new();
        let v = eval(&VcmNode::Literal(Variant::longint(5)), &stack, false).unwrap();
        assert_eq!(v, Variant::longint(5));
    }

    #[test]
    fn test_var_ref_first_match_wins() {
        let mut stack = scope_with(&[("x", Variant::longint(1))]);
        let inner = Variant::object();
        inner.object_set("x", Variant::longint(2)).unwrap();
        stack.push_scope(inner);
        let v = eval(&VcmNode::VarRef("x".into()), &stack, false).unwrap();
        assert_eq!(v, Variant::longint(2));
    }

    #[test]
    fn test_var_ref_missing_reports_not_exists() {
        errors::clear_last_error();
        let stack = ScopeStack::new();
        let r = eval(&VcmNode::VarRef("ghost".into()), &stack, false);
        assert_eq!(r, Err(errors::NOT_EXISTS));
        assert_eq!(errors::last_error(), errors::NOT_EXISTS);

        errors::clear_last_error();
        let r = eval(&VcmNode::VarRef("ghost".into()), &stack, true);
        assert_eq!(r, Err(errors::NOT_EXISTS));
        assert_eq!(errors::last_error(), errors::OK);
    }

    #[test]
    fn test_member_access_object_and_array() {
        let arr = Variant::array();
        arr.array_append(Variant::string("first")).unwrap();
        let stack = scope_with(&[("list", arr)]);

        let node = VcmNode::GetMember {
            base: Box::new(VcmNode::VarRef("list".into())),
            member: Box::new(VcmNode::Literal(Variant::longint(0))),
        };
        assert_eq!(
            eval(&node, &stack, false).unwrap(),
            Variant::string("first")
        );
    }

    #[test]
    fn test_dynamic_member_auto_invokes() {
        fn answer(_root: Option<&Variant>, _args: &[Variant], _s: bool) -> Result<Variant, ErrorCode> {
            Ok(Variant::longint(42))
        }
        let obj = Variant::object();
        obj.object_set("answer", Variant::dynamic(answer, None))
            .unwrap();
        let stack = scope_with(&[("sys", obj)]);
        let node = VcmNode::GetMember {
            base: Box::new(VcmNode::VarRef("sys".into())),
            member: Box::new(VcmNode::Literal(Variant::string("answer"))),
        };
        assert_eq!(eval(&node, &stack, false).unwrap(), Variant::longint(42));
    }

    #[test]
    fn test_call_with_args() {
        fn add(_root: Option<&Variant>, args: &[Variant], _s: bool) -> Result<Variant, ErrorCode> {
            let sum = args.iter().filter_map(|a| a.cast_to_i64()).sum();
            Ok(Variant::longint(sum))
        }
        let obj = Variant::object();
        obj.object_set("add", Variant::dynamic(add, None)).unwrap();
        let stack = scope_with(&[("m", obj)]);
        let node = VcmNode::Call {
            callee: Box::new(VcmNode::GetMember {
                base: Box::new(VcmNode::VarRef("m".into())),
                member: Box::new(VcmNode::Literal(Variant::string("add"))),
            }),
            args: vec![
                VcmNode::Literal(Variant::longint(2)),
                VcmNode::Literal(Variant::longint(3)),
            ],
        };
        assert_eq!(eval(&node, &stack, false).unwrap(), Variant::longint(5));
    }

    #[test]
    fn test_call_on_non_callable_fails() {
        let stack = scope_with(&[("x", Variant::longint(1))]);
        let node = VcmNode::Call {
            callee: Box::new(VcmNode::VarRef("x".into())),
            args: vec![],
        };
        assert_eq!(eval(&node, &stack, true), Err(errors::VCM_NOT_CALLABLE));
    }

    #[test]
    fn test_concat_string() {
        let stack = scope_with(&[("name", Variant::string("world"))]);
        let node = VcmNode::ConcatString(vec![
            VcmNode::Literal(Variant::string("hello ")),
            VcmNode::VarRef("name".into()),
            VcmNode::Literal(Variant::longint(1)),
        ]);
        assert_eq!(
            eval(&node, &stack, false).unwrap(),
            Variant::string("hello world1")
        );
    }

    #[test]
    fn test_object_and_array_literals() {
        let stack = ScopeStack::new();
        let node = VcmNode::ObjectLit(vec![(
            VcmNode::Literal(Variant::string("k")),
            VcmNode::ArrayLit(vec![VcmNode::Literal(Variant::longint(1))]),
        )]);
        let v = eval(&node, &stack, false).unwrap();
        assert_eq!(crate::serialize::to_json_string(&v), r#"{"k":[1]}"#);
    }

    #[test]
    fn test_tree_evaluates_many_times() {
        let node = VcmNode::VarRef("x".into());
        for n in 0..3 {
            let stack = scope_with(&[("x", Variant::longint(n))]);
            assert_eq!(eval(&node, &stack, false).unwrap(), Variant::longint(n));
        }
    }
}
