//! HVML Variant: the interpreter's uniform tagged value
//!
//! A `Variant` is a cheaply cloneable handle. Primitive tags carry their
//! payload inline; strings, byte sequences, native objects, and the three
//! containers share their payload behind `Arc`, so `clone` takes a second
//! owner and the last drop releases the payload. Containers hold strong
//! references to their members and are mutated only through the container
//! API, which is what lets them publish post-change notifications.
//!
//! The `vcm` module holds the Value Construction Model: expression trees the
//! tokenizer embeds in tokens, compiled once and evaluated many times
//! against a stack of scopes.

pub mod array;
pub mod compare;
pub mod container;
pub mod hooks;
pub mod native;
pub mod object;
pub mod serialize;
pub mod set;
pub mod value;
pub mod vcm;

pub use compare::{compare, equals};
pub use hooks::{ChangeKind, ListenerId};
pub use native::{NativeCell, NativeObject};
pub use value::{DynMethod, Variant, VariantType};
pub use vcm::{ScopeStack, VcmNode};

use hvml_core::errors;
use std::sync::Once;

static VARIANT_INIT: Once = Once::new();

static VARIANT_ERR_MSGS: &[&str] = &[
    "Wrong data type",
    "String is not in UTF-8 encoding",
    "Invalid operand",
];

static VCM_ERR_MSGS: &[&str] = &[
    "Variable not found in any scope",
    "Value is not callable",
    "No scope stack is active",
];

/// Register this crate's error-message segments. Idempotent; called by the
/// interpreter's init and by tests that read messages.
pub fn init_once() {
    VARIANT_INIT.call_once(|| {
        errors::init_generic_messages();
        errors::register_error_messages(errors::ErrorSegment {
            first: errors::FIRST_VARIANT,
            last: errors::FIRST_VARIANT + VARIANT_ERR_MSGS.len() as i32 - 1,
            messages: VARIANT_ERR_MSGS,
        })
        .expect("variant error segment registers once");
        errors::register_error_messages(errors::ErrorSegment {
            first: errors::FIRST_VCM,
            last: errors::FIRST_VCM + VCM_ERR_MSGS.len() as i32 - 1,
            messages: VCM_ERR_MSGS,
        })
        .expect("vcm error segment registers once");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_registers_segments() {
        init_once();
        assert_eq!(
            errors::message_for(errors::WRONG_DATA_TYPE),
            Some("Wrong data type")
        );
        assert_eq!(
            errors::message_for(errors::VCM_NOT_CALLABLE),
            Some("Value is not callable")
        );
        // Idempotent.
        init_once();
    }
}
