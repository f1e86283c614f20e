//! Built-in dynamic-variant objects
//!
//! Each DVObj is an object variant whose members are dynamic variants, all
//! built through the same (name, getter, setter) table. `$L` supplies the
//! logical predicates, `$SYS` the system probes, `$DOC` the document
//! accessors.

pub mod doc;
pub mod logical;
pub mod system;

use hvml_variant::{DynMethod, Variant};

pub struct DvObjEntry {
    pub name: &'static str,
    pub getter: DynMethod,
    pub setter: Option<DynMethod>,
}

/// Assemble a DVObj from its method table.
pub fn make_dvobj(entries: &[DvObjEntry]) -> Variant {
    let obj = Variant::object();
    for entry in entries {
        let dynamic = Variant::dynamic(entry.getter, entry.setter);
        let _ = obj.object_set(entry.name, dynamic);
    }
    obj
}
