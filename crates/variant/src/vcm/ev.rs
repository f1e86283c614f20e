//! Expression variables
//!
//! An expression variable wraps a compiled VCM tree in a native object so
//! HVML code can bind it by name and choose when to materialize it:
//! `eval` re-runs the tree on every access, `eval_const` memoizes the first
//! result, and `last_value` is a writable slot the observe path refreshes.

use crate::native::NativeObject;
use crate::value::Variant;
use crate::vcm::{self, VcmNode};
use hvml_core::errors::{self, ErrorCode};
use std::any::Any;
use std::sync::{Arc, Mutex};

pub const PROPERTY_EVAL: &str = "eval";
pub const PROPERTY_EVAL_CONST: &str = "eval_const";
pub const PROPERTY_VCM_EV: &str = "vcm_ev";
pub const PROPERTY_LAST_VALUE: &str = "last_value";

/// Native entity backing one expression variable.
pub struct ExpressionVariable {
    vcm: Arc<VcmNode>,
    const_value: Mutex<Option<Variant>>,
    last_value: Mutex<Option<Variant>>,
}

impl ExpressionVariable {
    fn eval_against_current(&self, silently: bool) -> Result<Variant, ErrorCode> {
        match vcm::with_current_scope_stack(|stack| vcm::eval(&self.vcm, stack, silently)) {
            Some(result) => result,
            None => {
                errors::set_last_error_silently(errors::VCM_NO_SCOPE, silently);
                Err(errors::VCM_NO_SCOPE)
            }
        }
    }

    /// The value seen by the most recent observation, if any.
    pub fn last_value(&self) -> Option<Variant> {
        self.last_value.lock().expect("last_value poisoned").clone()
    }
}

impl NativeObject for ExpressionVariable {
    fn name(&self) -> &str {
        "vcm_ev"
    }

    fn property_getter(
        &self,
        property: &str,
        _args: &[Variant],
        silently: bool,
    ) -> Result<Variant, ErrorCode> {
        match property {
            PROPERTY_EVAL => self.eval_against_current(silently),
            PROPERTY_EVAL_CONST => {
                let mut memo = self.const_value.lock().expect("const_value poisoned");
                if let Some(v) = memo.as_ref() {
                    return Ok(v.clone());
                }
                let v = self.eval_against_current(silently)?;
                *memo = Some(v.clone());
                Ok(v)
            }
            PROPERTY_VCM_EV => Ok(Variant::boolean(true)),
            PROPERTY_LAST_VALUE => Ok(self.last_value().unwrap_or(Variant::Undefined)),
            _ => {
                errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                Err(errors::NOT_EXISTS)
            }
        }
    }

    fn property_setter(
        &self,
        property: &str,
        args: &[Variant],
        silently: bool,
    ) -> Result<Variant, ErrorCode> {
        match (property, args.first()) {
            (PROPERTY_LAST_VALUE, Some(v)) => {
                *self.last_value.lock().expect("last_value poisoned") = Some(v.clone());
                Ok(v.clone())
            }
            (PROPERTY_LAST_VALUE, None) => {
                errors::set_last_error_silently(errors::WRONG_ARGS, silently);
                Err(errors::WRONG_ARGS)
            }
            _ => {
                errors::set_last_error_silently(errors::NOT_SUPPORTED, silently);
                Err(errors::NOT_SUPPORTED)
            }
        }
    }

    fn on_observe(&self, _event_type: &str, _event_sub_type: Option<&str>) -> bool {
        match self.eval_against_current(true) {
            Ok(v) => {
                *self.last_value.lock().expect("last_value poisoned") = Some(v);
                true
            }
            Err(_) => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wrap a compiled tree as an expression-variable native object.
pub fn to_expression_variable(vcm: Arc<VcmNode>) -> Variant {
    Variant::native(ExpressionVariable {
        vcm,
        const_value: Mutex::new(None),
        last_value: Mutex::new(None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcm::ScopeStack;

    fn install_scope(entries: &[(&str, Variant)]) {
        let obj = Variant::object();
        for (k, v) in entries {
            obj.object_set(*k, v.clone()).unwrap();
        }
        let mut stack = ScopeStack::new();
        stack.push_scope(obj);
        vcm::set_current_scope_stack(Some(stack));
    }

    #[test]
    fn test_eval_tracks_current_stack() {
        let ev = to_expression_variable(Arc::new(VcmNode::VarRef("x".into())));
        install_scope(&[("x", Variant::longint(1))]);
        assert_eq!(
            ev.native_property(PROPERTY_EVAL, &[], false).unwrap(),
            Variant::longint(1)
        );
        install_scope(&[("x", Variant::longint(2))]);
        assert_eq!(
            ev.native_property(PROPERTY_EVAL, &[], false).unwrap(),
            Variant::longint(2)
        );
        vcm::set_current_scope_stack(None);
    }

    #[test]
    fn test_eval_const_memoizes_first_result() {
        let ev = to_expression_variable(Arc::new(VcmNode::VarRef("x".into())));
        install_scope(&[("x", Variant::longint(10))]);
        assert_eq!(
            ev.native_property(PROPERTY_EVAL_CONST, &[], false).unwrap(),
            Variant::longint(10)
        );
        install_scope(&[("x", Variant::longint(99))]);
        assert_eq!(
            ev.native_property(PROPERTY_EVAL_CONST, &[], false).unwrap(),
            Variant::longint(10)
        );
        vcm::set_current_scope_stack(None);
    }

    #[test]
    fn test_vcm_ev_marker() {
        let ev = to_expression_variable(Arc::new(VcmNode::Literal(Variant::Null)));
        assert_eq!(
            ev.native_property(PROPERTY_VCM_EV, &[], false).unwrap(),
            Variant::boolean(true)
        );
    }

    #[test]
    fn test_last_value_slot() {
        let ev = to_expression_variable(Arc::new(VcmNode::Literal(Variant::Null)));
        assert_eq!(
            ev.native_property(PROPERTY_LAST_VALUE, &[], false).unwrap(),
            Variant::Undefined
        );
        let ops = ev.native_ops().unwrap();
        ops.property_setter(PROPERTY_LAST_VALUE, &[Variant::string("set")], false)
            .unwrap();
        assert_eq!(
            ev.native_property(PROPERTY_LAST_VALUE, &[], false).unwrap(),
            Variant::string("set")
        );
    }

    #[test]
    fn test_observe_refreshes_last_value() {
        let ev = to_expression_variable(Arc::new(VcmNode::VarRef("x".into())));
        install_scope(&[("x", Variant::string("observed"))]);
        assert!(ev.native_ops().unwrap().on_observe("change", None));
        assert_eq!(
            ev.native_property(PROPERTY_LAST_VALUE, &[], false).unwrap(),
            Variant::string("observed")
        );
        vcm::set_current_scope_stack(None);
    }

    #[test]
    fn test_eval_without_stack_fails() {
        vcm::set_current_scope_stack(None);
        let ev = to_expression_variable(Arc::new(VcmNode::Literal(Variant::Null)));
        assert_eq!(
            ev.native_property(PROPERTY_EVAL, &[], true),
            Err(errors::VCM_NO_SCOPE)
        );
    }
}
