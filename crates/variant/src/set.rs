//! Set container: unordered unique members
//!
//! Uniqueness is decided by the one total order in `compare`; storage keeps
//! members sorted by that order so membership tests are a binary search and
//! two equal sets iterate identically.

use crate::compare::compare;
use crate::hooks::{ChangeKind, Hooks};
use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};
use std::sync::Mutex;

#[derive(Default)]
pub struct SetPayload {
    // Sorted by `compare`; binary search gives membership.
    pub(crate) data: Mutex<Vec<Variant>>,
    pub(crate) hooks: Hooks,
}

impl Variant {
    fn as_set_payload(&self, silently: bool) -> Result<&SetPayload, ErrorCode> {
        match self {
            Variant::Set(p) => Ok(p),
            _ => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                Err(errors::WRONG_DATA_TYPE)
            }
        }
    }

    pub fn set_size(&self) -> Option<usize> {
        let p = self.as_set_payload(false).ok()?;
        Some(p.data.lock().expect("set payload poisoned").len())
    }

    pub fn set_contains(&self, value: &Variant) -> bool {
        let Ok(p) = self.as_set_payload(false) else {
            return false;
        };
        let data = p.data.lock().expect("set payload poisoned");
        data.binary_search_by(|m| compare(m, value)).is_ok()
    }

    /// Add a member. An equal member already present is kept untouched
    /// unless `overwrite` is set, in which case it is replaced. Returns
    /// whether the set changed.
    pub fn set_add(&self, value: Variant, overwrite: bool) -> Result<bool, ErrorCode> {
        let p = self.as_set_payload(false)?;
        p.hooks.mutation_guard(false)?;

        let outcome = {
            let mut data = p.data.lock().expect("set payload poisoned");
            match data.binary_search_by(|m| compare(m, &value)) {
                Ok(idx) if overwrite => {
                    let old = std::mem::replace(&mut data[idx], value.clone());
                    Some((ChangeKind::Change, vec![old, value]))
                }
                Ok(_) => None,
                Err(idx) => {
                    data.insert(idx, value.clone());
                    Some((ChangeKind::Grow, vec![value]))
                }
            }
        };

        match outcome {
            Some((kind, affected)) => {
                p.hooks.emit(self, kind, &affected);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the member equal to `value`. Returns whether one was present.
    pub fn set_remove(&self, value: &Variant) -> Result<bool, ErrorCode> {
        let p = self.as_set_payload(false)?;
        p.hooks.mutation_guard(false)?;

        let removed = {
            let mut data = p.data.lock().expect("set payload poisoned");
            match data.binary_search_by(|m| compare(m, value)) {
                Ok(idx) => Some(data.remove(idx)),
                Err(_) => None,
            }
        };

        match removed {
            Some(old) => {
                p.hooks.emit(self, ChangeKind::Shrink, &[old]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of members (sorted by the membership order).
    pub fn set_members(&self) -> Option<Vec<Variant>> {
        let p = self.as_set_payload(false).ok()?;
        Some(p.data.lock().expect("set payload poisoned").clone())
    }
}
