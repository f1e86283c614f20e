//! Array container: ordered sequence indexed from 0
//!
//! Backed by a growth-doubling vector. Every insertion takes an owner of
//! the member; every removal (including overwrite by `array_set`) drops
//! one.

use crate::hooks::{ChangeKind, Hooks};
use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};
use std::cmp::Ordering;
use std::sync::Mutex;

#[derive(Default)]
pub struct ArrayPayload {
    pub(crate) data: Mutex<Vec<Variant>>,
    pub(crate) hooks: Hooks,
}

impl Variant {
    fn as_array_payload(&self, silently: bool) -> Result<&ArrayPayload, ErrorCode> {
        match self {
            Variant::Array(p) => Ok(p),
            _ => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                Err(errors::WRONG_DATA_TYPE)
            }
        }
    }

    pub fn array_size(&self) -> Option<usize> {
        let p = self.as_array_payload(false).ok()?;
        Some(p.data.lock().expect("array payload poisoned").len())
    }

    /// Get by index; the returned variant is a new owner.
    pub fn array_get(&self, idx: usize) -> Option<Variant> {
        let p = self.as_array_payload(false).ok()?;
        let data = p.data.lock().expect("array payload poisoned");
        match data.get(idx) {
            Some(v) => Some(v.clone()),
            None => {
                errors::set_last_error(errors::NOT_EXISTS);
                None
            }
        }
    }

    pub fn array_append(&self, value: Variant) -> Result<(), ErrorCode> {
        let p = self.as_array_payload(false)?;
        p.hooks.mutation_guard(false)?;
        p.data
            .lock()
            .expect("array payload poisoned")
            .push(value.clone());
        p.hooks.emit(self, ChangeKind::Grow, &[value]);
        Ok(())
    }

    pub fn array_prepend(&self, value: Variant) -> Result<(), ErrorCode> {
        self.array_insert_before(0, value)
    }

    /// Insert so the new member lands at `idx`; `idx == len` appends.
    pub fn array_insert_before(&self, idx: usize, value: Variant) -> Result<(), ErrorCode> {
        let p = self.as_array_payload(false)?;
        p.hooks.mutation_guard(false)?;
        {
            let mut data = p.data.lock().expect("array payload poisoned");
            if idx > data.len() {
                errors::set_last_error(errors::INVALID_VALUE);
                return Err(errors::INVALID_VALUE);
            }
            data.insert(idx, value.clone());
        }
        p.hooks.emit(self, ChangeKind::Grow, &[value]);
        Ok(())
    }

    pub fn array_insert_after(&self, idx: usize, value: Variant) -> Result<(), ErrorCode> {
        self.array_insert_before(idx + 1, value)
    }

    /// Overwrite the member at `idx`, dropping the previous owner.
    pub fn array_set(&self, idx: usize, value: Variant) -> Result<(), ErrorCode> {
        let p = self.as_array_payload(false)?;
        p.hooks.mutation_guard(false)?;
        let old = {
            let mut data = p.data.lock().expect("array payload poisoned");
            match data.get_mut(idx) {
                Some(slot) => std::mem::replace(slot, value.clone()),
                None => {
                    errors::set_last_error(errors::INVALID_VALUE);
                    return Err(errors::INVALID_VALUE);
                }
            }
        };
        p.hooks.emit(self, ChangeKind::Change, &[old, value]);
        Ok(())
    }

    pub fn array_remove(&self, idx: usize) -> Result<(), ErrorCode> {
        let p = self.as_array_payload(false)?;
        p.hooks.mutation_guard(false)?;
        let removed = {
            let mut data = p.data.lock().expect("array payload poisoned");
            if idx >= data.len() {
                errors::set_last_error(errors::INVALID_VALUE);
                return Err(errors::INVALID_VALUE);
            }
            data.remove(idx)
        };
        p.hooks.emit(self, ChangeKind::Shrink, &[removed]);
        Ok(())
    }

    /// Sort in place with a caller-supplied comparator.
    pub fn array_sort_by(
        &self,
        mut cmp: impl FnMut(&Variant, &Variant) -> Ordering,
    ) -> Result<(), ErrorCode> {
        let p = self.as_array_payload(false)?;
        p.hooks.mutation_guard(false)?;
        p.data
            .lock()
            .expect("array payload poisoned")
            .sort_by(&mut cmp);
        p.hooks.emit(self, ChangeKind::Change, &[]);
        Ok(())
    }

    /// Snapshot of members in order.
    pub fn array_members(&self) -> Option<Vec<Variant>> {
        let p = self.as_array_payload(false).ok()?;
        Some(p.data.lock().expect("array payload poisoned").clone())
    }

    /// Append every member of `another` in order.
    pub fn array_append_another(
        &self,
        another: &Variant,
        silently: bool,
    ) -> Result<(), ErrorCode> {
        if self.same_identity(another) {
            errors::set_last_error_silently(errors::INVALID_OPERAND, silently);
            return Err(errors::INVALID_OPERAND);
        }
        self.as_array_payload(silently)?;
        let members = match another.array_members() {
            Some(m) => m,
            None => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                return Err(errors::WRONG_DATA_TYPE);
            }
        };
        for v in members {
            self.array_append(v)?;
        }
        Ok(())
    }

    /// Prepend every member of `another`, preserving the source order (the
    /// source is walked back-to-front).
    pub fn array_prepend_another(
        &self,
        another: &Variant,
        silently: bool,
    ) -> Result<(), ErrorCode> {
        if self.same_identity(another) {
            errors::set_last_error_silently(errors::INVALID_OPERAND, silently);
            return Err(errors::INVALID_OPERAND);
        }
        self.as_array_payload(silently)?;
        let members = match another.array_members() {
            Some(m) => m,
            None => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                return Err(errors::WRONG_DATA_TYPE);
            }
        };
        for v in members.into_iter().rev() {
            self.array_prepend(v)?;
        }
        Ok(())
    }

    /// Insert every member of `another` before `idx`, preserving order.
    pub fn array_insert_another_before(
        &self,
        idx: usize,
        another: &Variant,
        silently: bool,
    ) -> Result<(), ErrorCode> {
        if self.same_identity(another) {
            errors::set_last_error_silently(errors::INVALID_OPERAND, silently);
            return Err(errors::INVALID_OPERAND);
        }
        self.as_array_payload(silently)?;
        let members = match another.array_members() {
            Some(m) => m,
            None => {
                errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                return Err(errors::WRONG_DATA_TYPE);
            }
        };
        for v in members.into_iter().rev() {
            self.array_insert_before(idx, v)?;
        }
        Ok(())
    }

    pub fn array_insert_another_after(
        &self,
        idx: usize,
        another: &Variant,
        silently: bool,
    ) -> Result<(), ErrorCode> {
        self.array_insert_another_before(idx + 1, another, silently)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_refcounts() {
        let a = Variant::array();
        let s = Variant::string("x");
        let n = Variant::longint(7);
        a.array_append(s.clone()).unwrap();
        a.array_append(n.clone()).unwrap();
        assert_eq!(a.array_size(), Some(2));
        assert_eq!(a.array_get(0).unwrap().as_str(), Some("x"));
        assert_eq!(a.array_get(1).unwrap(), Variant::longint(7));
        assert_eq!(s.ref_count(), Some(2));

        a.array_remove(0).unwrap();
        assert_eq!(a.array_size(), Some(1));
        assert_eq!(a.array_get(0).unwrap(), Variant::longint(7));
        assert_eq!(s.ref_count(), Some(1));

        drop(a);
        assert_eq!(s.ref_count(), Some(1));
    }

    #[test]
    fn test_insert_positions() {
        let a = Variant::array();
        a.array_append(Variant::longint(1)).unwrap();
        a.array_append(Variant::longint(3)).unwrap();
        a.array_insert_after(0, Variant::longint(2)).unwrap();
        a.array_prepend(Variant::longint(0)).unwrap();
        let got: Vec<i64> = a
            .array_members()
            .unwrap()
            .iter()
            .map(|v| v.cast_to_i64().unwrap())
            .collect();
        assert_eq!(got, [0, 1, 2, 3]);
    }

    #[test]
    fn test_set_replaces_and_reports_change() {
        let a = Variant::array();
        a.array_append(Variant::longint(1)).unwrap();
        a.array_set(0, Variant::longint(9)).unwrap();
        assert_eq!(a.array_get(0).unwrap(), Variant::longint(9));
        assert_eq!(a.array_set(5, Variant::Null), Err(errors::INVALID_VALUE));
    }

    #[test]
    fn test_sort_by() {
        let a = Variant::array();
        for n in [3, 1, 2] {
            a.array_append(Variant::longint(n)).unwrap();
        }
        a.array_sort_by(crate::compare::compare).unwrap();
        let got: Vec<i64> = a
            .array_members()
            .unwrap()
            .iter()
            .map(|v| v.cast_to_i64().unwrap())
            .collect();
        assert_eq!(got, [1, 2, 3]);
    }

    #[test]
    fn test_append_and_prepend_another() {
        let a = Variant::array();
        a.array_append(Variant::longint(3)).unwrap();
        let b = Variant::array();
        b.array_append(Variant::longint(1)).unwrap();
        b.array_append(Variant::longint(2)).unwrap();

        a.array_prepend_another(&b, false).unwrap();
        a.array_append_another(&b, false).unwrap();
        let got: Vec<i64> = a
            .array_members()
            .unwrap()
            .iter()
            .map(|v| v.cast_to_i64().unwrap())
            .collect();
        assert_eq!(got, [1, 2, 3, 1, 2]);

        assert_eq!(
            a.array_append_another(&a, false),
            Err(errors::INVALID_OPERAND)
        );
    }

    #[test]
    fn test_wrong_type_reports() {
        errors::clear_last_error();
        let s = Variant::string("not an array");
        assert_eq!(s.array_append(Variant::Null), Err(errors::WRONG_DATA_TYPE));
        assert_eq!(errors::last_error(), errors::WRONG_DATA_TYPE);
        errors::clear_last_error();
    }
}
