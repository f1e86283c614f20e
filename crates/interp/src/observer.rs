//! Observers: (entity, event-type, sub-pattern) registrations
//!
//! An observer associates an observed entity with a VDOM position to run
//! when a matching event arrives. Matching is three-way: entity identity
//! (native entities by pointer, everything else by variant equality),
//! event-type atom equality, and a wildcard match over the sub-type.

use crate::edom::ElementHandle;
use crate::vdom::VdomElement;
use hvml_core::{Atom, wildcard_match};
use hvml_variant::Variant;
use std::sync::Arc;

#[derive(Clone)]
pub struct Observer {
    pub observed: Variant,
    /// Interned in the MSG bucket.
    pub event_type: Atom,
    /// `None` matches any sub-type.
    pub sub_type_pattern: Option<String>,
    pub scope: Variant,
    pub pos: Option<Arc<VdomElement>>,
    pub edom_element: ElementHandle,
}

impl Observer {
    pub fn new(observed: Variant, event_type: Atom, sub_type_pattern: Option<String>) -> Self {
        Observer {
            observed,
            event_type,
            sub_type_pattern,
            scope: Variant::object(),
            pos: None,
            edom_element: ElementHandle::default(),
        }
    }

    pub fn with_pos(mut self, pos: Arc<VdomElement>) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn with_scope(mut self, scope: Variant) -> Self {
        self.scope = scope;
        self
    }
}

/// The match predicate the dispatcher runs per observer.
pub fn is_observer_match(
    observer: &Observer,
    observed: &Variant,
    event_type: Atom,
    sub_type: Option<&str>,
) -> bool {
    let entity_matches = if observer.observed.is_native() || observed.is_native() {
        observer.observed.same_identity(observed)
    } else {
        observer.observed == *observed
    };
    if !entity_matches {
        return false;
    }

    if observer.event_type != event_type {
        return false;
    }

    match &observer.sub_type_pattern {
        None => true,
        Some(pattern) => wildcard_match(pattern, sub_type.unwrap_or("")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_core::AtomBucket;

    fn msg_atom(s: &str) -> Atom {
        Atom::intern_in(AtomBucket::Msg, s)
    }

    #[test]
    fn test_match_requires_entity_and_type() {
        let entity = Variant::string("button1");
        let obs = Observer::new(entity.clone(), msg_atom("clicked"), None);
        assert!(is_observer_match(&obs, &entity, msg_atom("clicked"), None));
        assert!(!is_observer_match(
            &obs,
            &entity,
            msg_atom("changed"),
            None
        ));
        assert!(!is_observer_match(
            &obs,
            &Variant::string("button2"),
            msg_atom("clicked"),
            None
        ));
    }

    #[test]
    fn test_sub_type_wildcards() {
        let entity = Variant::string("doc");
        let obs = Observer::new(entity.clone(), msg_atom("change"), Some("attr?".into()));
        assert!(is_observer_match(
            &obs,
            &entity,
            msg_atom("change"),
            Some("attrs")
        ));
        assert!(!is_observer_match(
            &obs,
            &entity,
            msg_atom("change"),
            Some("attr")
        ));

        let any = Observer::new(entity.clone(), msg_atom("change"), Some("*".into()));
        assert!(is_observer_match(&any, &entity, msg_atom("change"), None));
        assert!(is_observer_match(
            &any,
            &entity,
            msg_atom("change"),
            Some("anything")
        ));
    }

    #[test]
    fn test_native_entities_match_by_identity() {
        use hvml_variant::NativeObject;
        use std::any::Any;

        struct Entity;
        impl NativeObject for Entity {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let a = Variant::native(Entity);
        let b = a.clone();
        let c = Variant::native(Entity);
        let obs = Observer::new(a.clone(), msg_atom("fire"), None);
        assert!(is_observer_match(&obs, &b, msg_atom("fire"), None));
        assert!(!is_observer_match(&obs, &c, msg_atom("fire"), None));
    }

    #[test]
    fn test_equal_variants_match_without_identity() {
        let obs = Observer::new(Variant::longint(1), msg_atom("tick"), None);
        assert!(is_observer_match(
            &obs,
            &Variant::number(1.0),
            msg_atom("tick"),
            None
        ));
    }
}
