//! Native objects: opaque entities with a polymorphic capability set
//!
//! The C source models these as an opaque pointer plus a vtable of optional
//! function pointers. Here the vtable is a trait with default
//! implementations; each built-in dynamic object (DVObj) and the expression
//! variable are implementers. `on_release` fires when the last owner drops.

use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};
use std::any::Any;

/// The capability set of a native entity. All methods are optional in the
/// sense that the defaults report the failure the scheduler expects.
pub trait NativeObject: Any + Send + Sync {
    /// Name shown in diagnostics.
    fn name(&self) -> &str {
        "native"
    }

    /// Invoke the getter of the named property.
    fn property_getter(
        &self,
        _property: &str,
        _args: &[Variant],
        silently: bool,
    ) -> Result<Variant, ErrorCode> {
        errors::set_last_error_silently(errors::NOT_EXISTS, silently);
        Err(errors::NOT_EXISTS)
    }

    /// Invoke the setter of the named property.
    fn property_setter(
        &self,
        _property: &str,
        _args: &[Variant],
        silently: bool,
    ) -> Result<Variant, ErrorCode> {
        errors::set_last_error_silently(errors::NOT_SUPPORTED, silently);
        Err(errors::NOT_SUPPORTED)
    }

    /// Erase the named property entirely.
    fn property_eraser(&self, _property: &str) -> Result<(), ErrorCode> {
        errors::set_last_error(errors::NOT_SUPPORTED);
        Err(errors::NOT_SUPPORTED)
    }

    /// Reset the named property to its vacant state.
    fn property_cleaner(&self, _property: &str) -> Result<(), ErrorCode> {
        errors::set_last_error(errors::NOT_SUPPORTED);
        Err(errors::NOT_SUPPORTED)
    }

    /// Reset the whole entity.
    fn cleaner(&self) -> Result<(), ErrorCode> {
        errors::set_last_error(errors::NOT_SUPPORTED);
        Err(errors::NOT_SUPPORTED)
    }

    /// Notification that the entity gained an observer.
    fn on_observe(&self, _event_type: &str, _event_sub_type: Option<&str>) -> bool {
        true
    }

    /// Refresh hook invoked by the interpreter between steps.
    fn updater(&self) {}

    /// Invoked when the last owner drops.
    fn on_release(&self) {}

    /// Downcast support for collaborators that know the concrete entity.
    fn as_any(&self) -> &dyn Any;
}

/// Owner of a boxed native entity. The wrapper exists so the release hook
/// runs exactly once, at last-drop.
pub struct NativeCell {
    obj: Box<dyn NativeObject>,
}

impl NativeCell {
    pub fn new(obj: Box<dyn NativeObject>) -> Self {
        NativeCell { obj }
    }

    pub fn ops(&self) -> &dyn NativeObject {
        self.obj.as_ref()
    }
}

impl Drop for NativeCell {
    fn drop(&mut self) {
        self.obj.on_release();
    }
}

impl Variant {
    /// The entity behind a native variant.
    pub fn native_ops(&self) -> Option<&dyn NativeObject> {
        match self {
            Variant::Native(cell) => Some(cell.ops()),
            _ => None,
        }
    }

    /// Downcast the native entity to a known concrete type.
    pub fn native_entity<T: NativeObject>(&self) -> Option<&T> {
        self.native_ops()?.as_any().downcast_ref::<T>()
    }

    /// Call a property getter on a native variant.
    pub fn native_property(
        &self,
        property: &str,
        args: &[Variant],
        silently: bool,
    ) -> Result<Variant, ErrorCode> {
        match self.native_ops() {
            Some(ops) => ops.property_getter(property, args, silently),
            None => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                Err(errors::WRONG_DATA_TYPE)
            }
        }
    }
}
