//! `$DOC`: the rendered-document accessors
//!
//! The object carries its document handle in a hidden `__doc` member; the
//! getters read it back through their root argument. `doctype` and `query`
//! follow the EDOM collaborator surface, which is stubbed in this
//! revision: doctype identifiers come back empty (NOT_IMPLEMENTED) and
//! selector queries resolve to an empty element collection.

use super::{DvObjEntry, make_dvobj as build_dvobj};
use crate::edom::{self, DocumentHandle, ElementHandle};
use hvml_core::errors::{self, ErrorCode};
use hvml_variant::{NativeObject, Variant};
use std::any::Any;

const DOC_HANDLE_KEY: &str = "__doc";

fn doc_handle(root: Option<&Variant>, silently: bool) -> Result<DocumentHandle, ErrorCode> {
    let handle = root
        .and_then(|r| r.object_get_ex(DOC_HANDLE_KEY, true))
        .and_then(|v| v.cast_to_u64());
    match handle {
        Some(h) => Ok(DocumentHandle(h)),
        None => {
            errors::set_last_error_silently(errors::WRONG_ARGS, silently);
            Err(errors::WRONG_ARGS)
        }
    }
}

fn doctype_getter(
    root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let doc = doc_handle(root, silently)?;
    match args.first() {
        None => Ok(Variant::string(edom::doctype_all(doc))),
        Some(which) => match which.as_str() {
            Some("system") => Ok(Variant::string(edom::doctype_system(doc))),
            Some("public") => Ok(Variant::string(edom::doctype_public(doc))),
            Some(_) => {
                errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                Err(errors::NOT_EXISTS)
            }
            None => {
                errors::set_last_error_silently(errors::WRONG_ARGS, silently);
                Err(errors::WRONG_ARGS)
            }
        },
    }
}

/// The native collection a query returns.
pub struct QueryElements {
    elements: Vec<ElementHandle>,
}

impl QueryElements {
    pub fn elements(&self) -> &[ElementHandle] {
        &self.elements
    }
}

impl NativeObject for QueryElements {
    fn name(&self) -> &str {
        "query_elements"
    }

    fn property_getter(
        &self,
        property: &str,
        _args: &[Variant],
        silently: bool,
    ) -> Result<Variant, ErrorCode> {
        match property {
            "count" => Ok(Variant::ulongint(self.elements.len() as u64)),
            _ => {
                errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                Err(errors::NOT_EXISTS)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn query_getter(
    root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let doc = doc_handle(root, silently)?;
    let Some(css) = args.first().and_then(|v| v.as_str()) else {
        errors::set_last_error_silently(errors::WRONG_ARGS, silently);
        return Err(errors::WRONG_ARGS);
    };
    let elements = edom::query(doc, css);
    Ok(Variant::native(QueryElements { elements }))
}

/// Build a `$DOC` object bound to one document.
pub fn make_dvobj(doc: DocumentHandle) -> Variant {
    let obj = build_dvobj(&[
        DvObjEntry {
            name: "doctype",
            getter: doctype_getter,
            setter: None,
        },
        DvObjEntry {
            name: "query",
            getter: query_getter,
            setter: None,
        },
    ]);
    let _ = obj.object_set(DOC_HANDLE_KEY, Variant::ulongint(doc.0));
    obj
}
