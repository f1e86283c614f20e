//! One total order over variants
//!
//! Set membership, sorted-set storage, and observer equality all use this
//! single comparator. The order: type-family rank first, then payload.
//! The four numeric tags form one family compared as f64 ("numeric
//! coercion"); the three string-like tags (string, atom-string, exception)
//! form one family compared by text. Containers compare member-wise; cycles
//! between containers are the application's responsibility and will recurse.

use crate::value::{Variant, VariantType};
use std::cmp::Ordering;
use std::sync::Arc;

/// Family rank; variants of different families order by this alone.
fn rank(t: VariantType) -> u8 {
    match t {
        VariantType::Undefined => 0,
        VariantType::Null => 1,
        VariantType::Boolean => 2,
        VariantType::Number
        | VariantType::LongInt
        | VariantType::ULongInt
        | VariantType::LongDouble => 3,
        VariantType::AtomString | VariantType::String | VariantType::Exception => 4,
        VariantType::BSequence => 5,
        VariantType::Dynamic => 6,
        VariantType::Native => 7,
        VariantType::Object => 8,
        VariantType::Array => 9,
        VariantType::Set => 10,
    }
}

/// Total order over variants.
pub fn compare(a: &Variant, b: &Variant) -> Ordering {
    let ra = rank(a.variant_type());
    let rb = rank(b.variant_type());
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Variant::Undefined, Variant::Undefined) | (Variant::Null, Variant::Null) => {
            Ordering::Equal
        }
        (Variant::Boolean(x), Variant::Boolean(y)) => x.cmp(y),
        _ if ra == 3 => {
            // Numeric family: coerce to f64; total_cmp keeps NaN ordered.
            let x = a.cast_to_f64().unwrap_or(f64::NAN);
            let y = b.cast_to_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        _ if ra == 4 => a.as_str().unwrap_or("").cmp(b.as_str().unwrap_or("")),
        (Variant::BSequence(x), Variant::BSequence(y)) => x.as_ref().cmp(y.as_ref()),
        (
            Variant::Dynamic { getter: gx, .. },
            Variant::Dynamic { getter: gy, .. },
        ) => (*gx as usize).cmp(&(*gy as usize)),
        (Variant::Native(x), Variant::Native(y)) => {
            (Arc::as_ptr(x) as usize).cmp(&(Arc::as_ptr(y) as usize))
        }
        (Variant::Object(_), Variant::Object(_)) => compare_objects(a, b),
        (Variant::Array(_), Variant::Array(_)) => {
            let xs = a.array_members().unwrap_or_default();
            let ys = b.array_members().unwrap_or_default();
            compare_sequences(&xs, &ys)
        }
        (Variant::Set(_), Variant::Set(_)) => {
            // Set storage is already sorted by this comparator.
            let xs = a.set_members().unwrap_or_default();
            let ys = b.set_members().unwrap_or_default();
            compare_sequences(&xs, &ys)
        }
        _ => Ordering::Equal,
    }
}

fn compare_sequences(xs: &[Variant], ys: &[Variant]) -> Ordering {
    for (x, y) in xs.iter().zip(ys.iter()) {
        let ord = compare(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    xs.len().cmp(&ys.len())
}

fn compare_objects(a: &Variant, b: &Variant) -> Ordering {
    let mut xs = a.object_entries().unwrap_or_default();
    let mut ys = b.object_entries().unwrap_or_default();
    xs.sort_by(|(k1, _), (k2, _)| k1.cmp(k2));
    ys.sort_by(|(k1, _), (k2, _)| k1.cmp(k2));
    for ((kx, vx), (ky, vy)) in xs.iter().zip(ys.iter()) {
        let ord = kx.cmp(ky).then_with(|| compare(vx, vy));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    xs.len().cmp(&ys.len())
}

/// Deep structural equality modulo numeric coercion.
pub fn equals(a: &Variant, b: &Variant) -> bool {
    compare(a, b) == Ordering::Equal
}
