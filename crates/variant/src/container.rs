//! Container-level operations: displace, remove, and the set bulk family
//!
//! These dispatch on the destination tag and accept {object, array, set} as
//! source per the behavior matrix:
//!
//! | dst \ src | object          | array       | set         |
//! |-----------|-----------------|-------------|-------------|
//! | object    | merge kv pairs  | error       | error       |
//! | array     | error           | displace    | displace    |
//! | set       | one member      | elementwise | elementwise |
//!
//! Both operands must differ by identity. The set bulk operations (`unite`,
//! `intersect`, `subtract`, `xor`, `overwrite`) compute their target into a
//! scratch array first and displace in one final step, so the destination
//! is never observed half-updated.

use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};

fn check_operands(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    if dst.same_identity(src) {
        errors::set_last_error_silently(errors::INVALID_OPERAND, silently);
        return Err(errors::INVALID_OPERAND);
    }
    Ok(())
}

/// Members of an array or set source, in iteration order.
fn source_members(src: &Variant, silently: bool) -> Result<Vec<Variant>, ErrorCode> {
    match src {
        Variant::Array(_) => Ok(src.array_members().unwrap_or_default()),
        Variant::Set(_) => Ok(src.set_members().unwrap_or_default()),
        _ => {
            errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
            Err(errors::WRONG_DATA_TYPE)
        }
    }
}

fn object_clear(dst: &Variant, silently: bool) -> Result<(), ErrorCode> {
    for (k, _) in dst.object_entries().unwrap_or_default() {
        dst.object_remove(&k, silently)?;
    }
    Ok(())
}

fn array_clear(dst: &Variant) -> Result<(), ErrorCode> {
    while dst.array_size().unwrap_or(0) > 0 {
        dst.array_remove(0)?;
    }
    Ok(())
}

fn set_clear(dst: &Variant) -> Result<(), ErrorCode> {
    for member in dst.set_members().unwrap_or_default() {
        dst.set_remove(&member)?;
    }
    Ok(())
}

/// Replace the contents of `dst` with the contents of `src`.
pub fn displace(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_operands(dst, src, silently)?;
    match dst {
        Variant::Object(_) => {
            let entries = match src.object_entries() {
                Some(e) => e,
                None => {
                    errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                    return Err(errors::WRONG_DATA_TYPE);
                }
            };
            object_clear(dst, silently)?;
            for (k, v) in entries {
                dst.object_set_ex(k, v, silently)?;
            }
            Ok(())
        }
        Variant::Array(_) => {
            let members = source_members(src, silently)?;
            array_clear(dst)?;
            for v in members {
                dst.array_append(v)?;
            }
            Ok(())
        }
        Variant::Set(_) => {
            match src {
                Variant::Object(_) => {
                    set_clear(dst)?;
                    dst.set_add(src.clone(), false)?;
                }
                Variant::Array(_) | Variant::Set(_) => {
                    let members = source_members(src, silently)?;
                    set_clear(dst)?;
                    for v in members {
                        dst.set_add(v, false)?;
                    }
                }
                _ => {
                    errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                    return Err(errors::WRONG_DATA_TYPE);
                }
            }
            Ok(())
        }
        _ => {
            errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
            Err(errors::WRONG_DATA_TYPE)
        }
    }
}

/// Remove from `dst` everything `src` names.
pub fn remove(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_operands(dst, src, silently)?;
    match dst {
        Variant::Object(_) => {
            let entries = match src.object_entries() {
                Some(e) => e,
                None => {
                    errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                    return Err(errors::WRONG_DATA_TYPE);
                }
            };
            for (k, _) in entries {
                // Keys absent from dst are not an error for bulk removal.
                match dst.object_remove(&k, true) {
                    Ok(()) | Err(errors::NOT_EXISTS) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
        Variant::Array(_) => {
            let members = source_members(src, silently)?;
            for v in members {
                let snapshot = dst.array_members().unwrap_or_default();
                if let Some(idx) = snapshot.iter().position(|m| crate::equals(m, &v)) {
                    dst.array_remove(idx)?;
                }
            }
            Ok(())
        }
        Variant::Set(_) => {
            match src {
                Variant::Object(_) => {
                    dst.set_remove(src)?;
                }
                Variant::Array(_) | Variant::Set(_) => {
                    for v in source_members(src, silently)? {
                        dst.set_remove(&v)?;
                    }
                }
                _ => {
                    errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
                    return Err(errors::WRONG_DATA_TYPE);
                }
            }
            Ok(())
        }
        _ => {
            errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
            Err(errors::WRONG_DATA_TYPE)
        }
    }
}

fn check_set_dst(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_operands(dst, src, silently)?;
    if !dst.is_set() {
        errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
        return Err(errors::WRONG_DATA_TYPE);
    }
    Ok(())
}

/// dst := dst ∪ src. Members already present are overwritten by the source
/// flavor.
pub fn set_unite(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_set_dst(dst, src, silently)?;
    for v in source_members(src, silently)? {
        dst.set_add(v, true)?;
    }
    Ok(())
}

/// dst := dst ∩ src, built in a scratch array and displaced in one step.
pub fn set_intersect(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_set_dst(dst, src, silently)?;
    let result = Variant::array();
    for v in source_members(src, silently)? {
        if dst.set_contains(&v) {
            result.array_append(v)?;
        }
    }
    displace(dst, &result, silently)
}

/// dst := dst \ src, built in a scratch array and displaced in one step.
pub fn set_subtract(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_set_dst(dst, src, silently)?;
    let src_members = source_members(src, silently)?;
    let result = Variant::array();
    for v in dst.set_members().unwrap_or_default() {
        if !src_members.iter().any(|m| crate::equals(m, &v)) {
            result.array_append(v)?;
        }
    }
    displace(dst, &result, silently)
}

/// dst := dst ⊕ src (symmetric difference), scratch array + one displace.
pub fn set_xor(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_set_dst(dst, src, silently)?;
    let src_members = source_members(src, silently)?;
    let dst_members = dst.set_members().unwrap_or_default();
    let result = Variant::array();
    for v in &dst_members {
        if !src_members.iter().any(|m| crate::equals(m, v)) {
            result.array_append(v.clone())?;
        }
    }
    for v in &src_members {
        if !dst_members.iter().any(|m| crate::equals(m, v)) {
            result.array_append(v.clone())?;
        }
    }
    displace(dst, &result, silently)
}

/// Overwrite members of `dst` equal to members named by `src`; an object
/// source counts as one member.
pub fn set_overwrite(dst: &Variant, src: &Variant, silently: bool) -> Result<(), ErrorCode> {
    check_operands(dst, src, silently)?;
    if !dst.is_set() {
        errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
        return Err(errors::WRONG_DATA_TYPE);
    }
    match src {
        Variant::Object(_) => {
            dst.set_add(src.clone(), true)?;
            Ok(())
        }
        Variant::Array(_) | Variant::Set(_) => {
            for v in source_members(src, silently)? {
                dst.set_add(v, true)?;
            }
            Ok(())
        }
        _ => {
            errors::set_last_error_silently(errors::WRONG_DATA_TYPE, silently);
            Err(errors::WRONG_DATA_TYPE)
        }
    }
}
