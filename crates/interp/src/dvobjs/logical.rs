//! `$L`: logical predicates
//!
//! Every method coerces its operands to boolean by the one truthiness
//! table (numeric zero, empty text, and empty containers are false;
//! dynamic and native entities are true) or, for the ordering predicates,
//! to f64.

use super::{DvObjEntry, make_dvobj as build_dvobj};
use hvml_core::errors::{self, ErrorCode};
use hvml_variant::{Variant, equals};

fn require_args(args: &[Variant], n: usize, silently: bool) -> Result<(), ErrorCode> {
    if args.len() < n {
        errors::set_last_error_silently(errors::WRONG_ARGS, silently);
        return Err(errors::WRONG_ARGS);
    }
    Ok(())
}

fn logical_not(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    require_args(args, 1, silently)?;
    Ok(Variant::boolean(!args[0].to_boolean()))
}

fn logical_and(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    require_args(args, 2, silently)?;
    Ok(Variant::boolean(args.iter().all(Variant::to_boolean)))
}

fn logical_or(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    require_args(args, 2, silently)?;
    Ok(Variant::boolean(args.iter().any(Variant::to_boolean)))
}

fn logical_xor(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    require_args(args, 2, silently)?;
    Ok(Variant::boolean(args[0].to_boolean() != args[1].to_boolean()))
}

fn logical_eq(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    require_args(args, 2, silently)?;
    Ok(Variant::boolean(equals(&args[0], &args[1])))
}

fn logical_ne(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    require_args(args, 2, silently)?;
    Ok(Variant::boolean(!equals(&args[0], &args[1])))
}

fn numeric_pair(args: &[Variant], silently: bool) -> Result<(f64, f64), ErrorCode> {
    require_args(args, 2, silently)?;
    match (args[0].cast_to_f64(), args[1].cast_to_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => {
            errors::set_last_error_silently(errors::WRONG_ARGS, silently);
            Err(errors::WRONG_ARGS)
        }
    }
}

fn logical_gt(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let (a, b) = numeric_pair(args, silently)?;
    Ok(Variant::boolean(a > b))
}

fn logical_ge(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let (a, b) = numeric_pair(args, silently)?;
    Ok(Variant::boolean(a >= b))
}

fn logical_lt(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let (a, b) = numeric_pair(args, silently)?;
    Ok(Variant::boolean(a < b))
}

fn logical_le(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let (a, b) = numeric_pair(args, silently)?;
    Ok(Variant::boolean(a <= b))
}

/// Build the `$L` object.
pub fn make_dvobj() -> Variant {
    build_dvobj(&[
        DvObjEntry {
            name: "not",
            getter: logical_not,
            setter: None,
        },
        DvObjEntry {
            name: "and",
            getter: logical_and,
            setter: None,
        },
        DvObjEntry {
            name: "or",
            getter: logical_or,
            setter: None,
        },
        DvObjEntry {
            name: "xor",
            getter: logical_xor,
            setter: None,
        },
        DvObjEntry {
            name: "eq",
            getter: logical_eq,
            setter: None,
        },
        DvObjEntry {
            name: "ne",
            getter: logical_ne,
            setter: None,
        },
        DvObjEntry {
            name: "gt",
            getter: logical_gt,
            setter: None,
        },
        DvObjEntry {
            name: "ge",
            getter: logical_ge,
            setter: None,
        },
        DvObjEntry {
            name: "lt",
            getter: logical_lt,
            setter: None,
        },
        DvObjEntry {
            name: "le",
            getter: logical_le,
            setter: None,
        },
    ])
}
