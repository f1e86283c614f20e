//! EDOM collaborator surface
//!
//! The entity DOM lives outside this workspace; the interpreter holds only
//! opaque handles into it and the few queries the core makes. `query` and
//! the doctype accessors await the collaborator: selector queries resolve
//! to nothing and doctype lookups report NOT_IMPLEMENTED, matching the
//! placeholder behavior of the reference runtime.

use hvml_core::errors;

/// Opaque handle of a rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentHandle(pub u64);

/// Opaque handle of an element within a rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementHandle(pub u64);

/// CSS selector query. Mocked: always empty in this revision.
pub fn query(doc: DocumentHandle, css: &str) -> Vec<ElementHandle> {
    tracing::debug!(doc = doc.0, css, "edom query (mocked, returns empty)");
    Vec::new()
}

/// The full doctype string. Stubbed pending the EDOM collaborator.
pub fn doctype_all(_doc: DocumentHandle) -> String {
    errors::set_last_error(errors::NOT_IMPLEMENTED);
    String::new()
}

/// The SYSTEM identifier. Stubbed pending the EDOM collaborator.
pub fn doctype_system(_doc: DocumentHandle) -> String {
    errors::set_last_error(errors::NOT_IMPLEMENTED);
    String::new()
}

/// The PUBLIC identifier. Stubbed pending the EDOM collaborator.
pub fn doctype_public(_doc: DocumentHandle) -> String {
    errors::set_last_error(errors::NOT_IMPLEMENTED);
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_empty_in_this_revision() {
        assert!(query(DocumentHandle(1), "div.item").is_empty());
    }

    #[test]
    fn test_doctype_stubs_report_not_implemented() {
        errors::clear_last_error();
        assert_eq!(doctype_system(DocumentHandle(1)), "");
        assert_eq!(errors::last_error(), errors::NOT_IMPLEMENTED);
        errors::clear_last_error();
    }
}
