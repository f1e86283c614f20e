//! Object container: insertion-preserving string-keyed map
//!
//! Keys are strings compared by byte equality; iteration yields entries in
//! insertion order. Members are strong references: setting a key takes an
//! owner, removing one drops an owner.

use crate::hooks::{ChangeKind, Hooks, ListenerId};
use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};
use std::sync::Mutex;

#[derive(Default)]
pub struct ObjectPayload {
    // Small maps dominate; a vector of pairs keeps insertion order for free.
    pub(crate) data: Mutex<Vec<(String, Variant)>>,
    pub(crate) hooks: Hooks,
}

impl Variant {
    fn as_object_payload(&self, silently: bool) -> Result<&ObjectPayload, ErrorCode> {
        match self {
            Variant::Object(p) => Ok(p),
            _ => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                Err(errors::WRONG_DATA_TYPE)
            }
        }
    }

    /// Number of entries; `None` (with `WRONG_DATA_TYPE`) on non-objects.
    pub fn object_size(&self) -> Option<usize> {
        let p = self.as_object_payload(false).ok()?;
        Some(p.data.lock().expect("object payload poisoned").len())
    }

    /// Get a member by key; the returned variant is a new owner.
    pub fn object_get(&self, key: &str) -> Option<Variant> {
        self.object_get_ex(key, false)
    }

    pub fn object_get_ex(&self, key: &str, silently: bool) -> Option<Variant> {
        let p = self.as_object_payload(silently).ok()?;
        let data = p.data.lock().expect("object payload poisoned");
        match data.iter().find(|(k, _)| k == key) {
            Some((_, v)) => Some(v.clone()),
            None => {
                errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                None
            }
        }
    }

    /// Insert or replace. Returns `true` when an existing member was
    /// replaced. Emits `Change` on replace, `Grow` on insert.
    pub fn object_set(&self, key: impl Into<String>, value: Variant) -> Result<bool, ErrorCode> {
        self.object_set_ex(key, value, false)
    }

    pub fn object_set_ex(
        &self,
        key: impl Into<String>,
        value: Variant,
        silently: bool,
    ) -> Result<bool, ErrorCode> {
        let key = key.into();
        let p = self.as_object_payload(silently)?;
        p.hooks.mutation_guard(silently)?;

        let (kind, affected) = {
            let mut data = p.data.lock().expect("object payload poisoned");
            match data.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => {
                    let old = std::mem::replace(&mut entry.1, value.clone());
                    (
                        ChangeKind::Change,
                        vec![Variant::string(key), old, value],
                    )
                }
                None => {
                    data.push((key.clone(), value.clone()));
                    (ChangeKind::Grow, vec![Variant::string(key), value])
                }
            }
        };

        let replaced = kind == ChangeKind::Change;
        p.hooks.emit(self, kind, &affected);
        Ok(replaced)
    }

    /// Remove a member by key, dropping one owner of the value.
    pub fn object_remove(&self, key: &str, silently: bool) -> Result<(), ErrorCode> {
        let p = self.as_object_payload(silently)?;
        p.hooks.mutation_guard(silently)?;

        let removed = {
            let mut data = p.data.lock().expect("object payload poisoned");
            match data.iter().position(|(k, _)| k == key) {
                Some(idx) => {
                    let (k, v) = data.remove(idx);
                    Some(vec![Variant::string(k), v])
                }
                None => None,
            }
        };

        match removed {
            Some(affected) => {
                p.hooks.emit(self, ChangeKind::Shrink, &affected);
                Ok(())
            }
            None => {
                errors::set_last_error_silently(errors::NOT_EXISTS, silently);
                Err(errors::NOT_EXISTS)
            }
        }
    }

    /// Snapshot of entries in insertion order. Safe to mutate the object
    /// while walking the snapshot.
    pub fn object_entries(&self) -> Option<Vec<(String, Variant)>> {
        let p = self.as_object_payload(false).ok()?;
        Some(p.data.lock().expect("object payload poisoned").clone())
    }

    /// Copy every (k, v) of `another` into `self` via set-by-key.
    pub fn object_merge_another(
        &self,
        another: &Variant,
        silently: bool,
    ) -> Result<(), ErrorCode> {
        if self.same_identity(another) {
            errors::set_last_error_silently(errors::INVALID_OPERAND, silently);
            return Err(errors::INVALID_OPERAND);
        }
        self.as_object_payload(silently)?;
        let entries = match another.object_entries() {
            Some(e) => e,
            None => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                return Err(errors::WRONG_DATA_TYPE);
            }
        };
        for (k, v) in entries {
            self.object_set_ex(k, v, silently)?;
        }
        Ok(())
    }

    /// Register a post-change listener on a container.
    pub fn add_listener(
        &self,
        f: impl Fn(&Variant, ChangeKind, &[Variant]) + Send + Sync + 'static,
    ) -> Result<ListenerId, ErrorCode> {
        match self {
            Variant::Object(p) => Ok(p.hooks.add(f)),
            Variant::Array(p) => Ok(p.hooks.add(f)),
            Variant::Set(p) => Ok(p.hooks.add(f)),
            _ => {
                errors::set_last_error(errors::WRONG_DATA_TYPE);
                Err(errors::WRONG_DATA_TYPE)
            }
        }
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        match self {
            Variant::Object(p) => p.hooks.remove(id),
            Variant::Array(p) => p.hooks.remove(id),
            Variant::Set(p) => p.hooks.remove(id),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_get_remove() {
        let obj = Variant::object();
        assert_eq!(obj.object_set("name", Variant::string("cat")), Ok(false));
        assert_eq!(obj.object_set("name", Variant::string("dog")), Ok(true));
        assert_eq!(obj.object_get("name").unwrap().as_str(), Some("dog"));
        assert_eq!(obj.object_size(), Some(1));
        obj.object_remove("name", false).unwrap();
        assert_eq!(obj.object_size(), Some(0));
        assert_eq!(obj.object_remove("name", false), Err(errors::NOT_EXISTS));
    }

    #[test]
    fn test_insertion_order_is_stable() {
        let obj = Variant::object();
        for key in ["z", "a", "m"] {
            obj.object_set(key, Variant::Null).unwrap();
        }
        let keys: Vec<String> = obj
            .object_entries()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_member_refcount_discipline() {
        let obj = Variant::object();
        let v = Variant::string("member");
        assert_eq!(v.ref_count(), Some(1));
        obj.object_set("k", v.clone()).unwrap();
        assert_eq!(v.ref_count(), Some(2));
        obj.object_remove("k", false).unwrap();
        assert_eq!(v.ref_count(), Some(1));
    }

    #[test]
    fn test_merge_another() {
        let a = Variant::object();
        a.object_set("x", Variant::longint(1)).unwrap();
        let b = Variant::object();
        b.object_set("x", Variant::longint(9)).unwrap();
        b.object_set("y", Variant::longint(2)).unwrap();
        a.object_merge_another(&b, false).unwrap();
        assert_eq!(a.object_get("x").unwrap(), Variant::longint(9));
        assert_eq!(a.object_get("y").unwrap(), Variant::longint(2));
        assert_eq!(a.object_merge_another(&a, false), Err(errors::INVALID_OPERAND));
    }

    #[test]
    fn test_grow_change_shrink_events() {
        let obj = Variant::object();
        let grows = Arc::new(AtomicUsize::new(0));
        let changes = Arc::new(AtomicUsize::new(0));
        let shrinks = Arc::new(AtomicUsize::new(0));
        let (g, c, s) = (grows.clone(), changes.clone(), shrinks.clone());
        obj.add_listener(move |_, kind, _| match kind {
            ChangeKind::Grow => {
                g.fetch_add(1, Ordering::SeqCst);
            }
            ChangeKind::Change => {
                c.fetch_add(1, Ordering::SeqCst);
            }
            ChangeKind::Shrink => {
                s.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        obj.object_set("k", Variant::longint(1)).unwrap();
        obj.object_set("k", Variant::longint(2)).unwrap();
        obj.object_remove("k", false).unwrap();
        assert_eq!(grows.load(Ordering::SeqCst), 1);
        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert_eq!(shrinks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_must_not_mutate_source() {
        let obj = Variant::object();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        obj.add_listener(move |src, _, _| {
            // Re-entrant mutation is rejected with WRONG_STAGE.
            assert_eq!(
                src.object_set_ex("again", Variant::Null, true),
                Err(errors::WRONG_STAGE)
            );
            seen2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        obj.object_set("k", Variant::Null).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        // The rejected mutation never landed.
        assert_eq!(obj.object_size(), Some(1));
    }
}
