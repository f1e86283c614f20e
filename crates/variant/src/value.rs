//! The tagged value and its constructors, predicates, and casts
//!
//! Tags follow the interpreter's data model: four numeric flavors share the
//! truthiness and coercion rules, strings know their character count in
//! O(1), and the three containers (object, array, set) live behind shared
//! payloads so that cloning a variant never copies members.

use crate::array::ArrayPayload;
use crate::native::{NativeCell, NativeObject};
use crate::object::ObjectPayload;
use crate::set::SetPayload;
use hvml_core::errors::{self, ErrorCode};
use hvml_core::{Atom, AtomBucket};
use std::sync::Arc;

/// The uniform method signature for dynamic variants: (root, args, silently).
pub type DynMethod = fn(Option<&Variant>, &[Variant], bool) -> Result<Variant, ErrorCode>;

/// String payload: validated UTF-8 plus a character count fixed at
/// construction.
#[derive(Debug)]
pub struct VString {
    text: String,
    nr_chars: usize,
}

impl VString {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Character (scalar value) count, not byte count.
    pub fn nr_chars(&self) -> usize {
        self.nr_chars
    }

    pub fn len_bytes(&self) -> usize {
        self.text.len()
    }
}

/// Discriminant of a variant, used for predicates and the total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    Undefined,
    Null,
    Boolean,
    Exception,
    Number,
    LongInt,
    ULongInt,
    LongDouble,
    AtomString,
    String,
    BSequence,
    Dynamic,
    Native,
    Object,
    Array,
    Set,
}

/// The interpreter's uniform tagged value. Clone is cheap: inline payloads
/// copy, shared payloads take another owner.
#[derive(Clone)]
pub enum Variant {
    Undefined,
    Null,
    Boolean(bool),
    Exception(Atom),
    Number(f64),
    LongInt(i64),
    ULongInt(u64),
    /// Distinct tag; payload shares the f64 representation (no stable f128).
    LongDouble(f64),
    AtomString(Atom),
    String(Arc<VString>),
    BSequence(Arc<[u8]>),
    Dynamic {
        getter: DynMethod,
        setter: Option<DynMethod>,
    },
    Native(Arc<NativeCell>),
    Object(Arc<ObjectPayload>),
    Array(Arc<ArrayPayload>),
    Set(Arc<SetPayload>),
}

impl Variant {
    // Constructors. Each fresh value starts with a single owner.

    pub fn boolean(b: bool) -> Variant {
        Variant::Boolean(b)
    }

    pub fn number(n: f64) -> Variant {
        Variant::Number(n)
    }

    pub fn longint(n: i64) -> Variant {
        Variant::LongInt(n)
    }

    pub fn ulongint(n: u64) -> Variant {
        Variant::ULongInt(n)
    }

    pub fn longdouble(n: f64) -> Variant {
        Variant::LongDouble(n)
    }

    pub fn string(text: impl Into<String>) -> Variant {
        let text = text.into();
        let nr_chars = text.chars().count();
        Variant::String(Arc::new(VString { text, nr_chars }))
    }

    /// Build a string variant from raw bytes, validating UTF-8.
    pub fn string_from_bytes(bytes: Vec<u8>) -> Result<Variant, ErrorCode> {
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Variant::string(text)),
            Err(_) => {
                errors::set_last_error(errors::STRING_NOT_UTF8);
                Err(errors::STRING_NOT_UTF8)
            }
        }
    }

    pub fn atom_string(text: &str) -> Variant {
        Variant::AtomString(Atom::intern(text))
    }

    pub fn exception(kind: &str) -> Variant {
        Variant::Exception(Atom::intern_in(AtomBucket::Msg, kind))
    }

    pub fn bsequence(bytes: impl Into<Arc<[u8]>>) -> Variant {
        Variant::BSequence(bytes.into())
    }

    pub fn dynamic(getter: DynMethod, setter: Option<DynMethod>) -> Variant {
        Variant::Dynamic { getter, setter }
    }

    pub fn native(obj: impl NativeObject) -> Variant {
        Variant::Native(Arc::new(NativeCell::new(Box::new(obj))))
    }

    pub fn object() -> Variant {
        Variant::Object(Arc::new(ObjectPayload::default()))
    }

    pub fn array() -> Variant {
        Variant::Array(Arc::new(ArrayPayload::default()))
    }

    pub fn set() -> Variant {
        Variant::Set(Arc::new(SetPayload::default()))
    }

    /// The discriminant.
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Undefined => VariantType::Undefined,
            Variant::Null => VariantType::Null,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::Exception(_) => VariantType::Exception,
            Variant::Number(_) => VariantType::Number,
            Variant::LongInt(_) => VariantType::LongInt,
            Variant::ULongInt(_) => VariantType::ULongInt,
            Variant::LongDouble(_) => VariantType::LongDouble,
            Variant::AtomString(_) => VariantType::AtomString,
            Variant::String(_) => VariantType::String,
            Variant::BSequence(_) => VariantType::BSequence,
            Variant::Dynamic { .. } => VariantType::Dynamic,
            Variant::Native(_) => VariantType::Native,
            Variant::Object(_) => VariantType::Object,
            Variant::Array(_) => VariantType::Array,
            Variant::Set(_) => VariantType::Set,
        }
    }

    // Type predicates; none of these allocate.

    pub fn is_undefined(&self) -> bool {
        matches!(self, Variant::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Variant::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Variant::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Variant::String(_) | Variant::AtomString(_))
    }

    pub fn is_bsequence(&self) -> bool {
        matches!(self, Variant::BSequence(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Variant::Dynamic { .. })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Variant::Native(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Variant::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Variant::Set(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Variant::Object(_) | Variant::Array(_) | Variant::Set(_)
        )
    }

    /// Text of string-like variants (string, atom-string, exception).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s.as_str()),
            Variant::AtomString(a) | Variant::Exception(a) => Some(a.as_str()),
            _ => None,
        }
    }

    /// Character count of string variants, O(1).
    pub fn nr_chars(&self) -> Option<usize> {
        match self {
            Variant::String(s) => Some(s.nr_chars()),
            Variant::AtomString(a) | Variant::Exception(a) => Some(a.as_str().chars().count()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Variant::BSequence(b) => Some(b),
            _ => None,
        }
    }

    /// Number of owners of the shared payload, when the tag has one. Inline
    /// tags return `None`: they have no shared state to count.
    pub fn ref_count(&self) -> Option<usize> {
        match self {
            Variant::String(p) => Some(Arc::strong_count(p)),
            Variant::BSequence(p) => Some(Arc::strong_count(p)),
            Variant::Native(p) => Some(Arc::strong_count(p)),
            Variant::Object(p) => Some(Arc::strong_count(p)),
            Variant::Array(p) => Some(Arc::strong_count(p)),
            Variant::Set(p) => Some(Arc::strong_count(p)),
            _ => None,
        }
    }

    /// Identity comparison for shared-payload variants; inline tags fall
    /// back to structural equality.
    pub fn same_identity(&self, other: &Variant) -> bool {
        match (self, other) {
            (Variant::String(a), Variant::String(b)) => Arc::ptr_eq(a, b),
            (Variant::BSequence(a), Variant::BSequence(b)) => Arc::ptr_eq(a, b),
            (Variant::Native(a), Variant::Native(b)) => Arc::ptr_eq(a, b),
            (Variant::Object(a), Variant::Object(b)) => Arc::ptr_eq(a, b),
            (Variant::Array(a), Variant::Array(b)) => Arc::ptr_eq(a, b),
            (Variant::Set(a), Variant::Set(b)) => Arc::ptr_eq(a, b),
            _ => crate::compare::equals(self, other),
        }
    }

    // Casts. Numeric tags coerce among themselves; booleans count as 0/1;
    // string-like payloads parse.

    pub fn cast_to_i64(&self) -> Option<i64> {
        match self {
            Variant::Boolean(b) => Some(*b as i64),
            Variant::Number(n) | Variant::LongDouble(n) => {
                n.is_finite().then_some(*n as i64)
            }
            Variant::LongInt(n) => Some(*n),
            Variant::ULongInt(n) => i64::try_from(*n).ok(),
            Variant::String(_) | Variant::AtomString(_) => {
                self.as_str().and_then(|s| s.trim().parse().ok())
            }
            _ => None,
        }
    }

    pub fn cast_to_u64(&self) -> Option<u64> {
        match self {
            Variant::Boolean(b) => Some(*b as u64),
            Variant::Number(n) | Variant::LongDouble(n) => {
                (n.is_finite() && *n >= 0.0).then_some(*n as u64)
            }
            Variant::LongInt(n) => u64::try_from(*n).ok(),
            Variant::ULongInt(n) => Some(*n),
            Variant::String(_) | Variant::AtomString(_) => {
                self.as_str().and_then(|s| s.trim().parse().ok())
            }
            _ => None,
        }
    }

    pub fn cast_to_f64(&self) -> Option<f64> {
        match self {
            Variant::Boolean(b) => Some(*b as u8 as f64),
            Variant::Number(n) | Variant::LongDouble(n) => Some(*n),
            Variant::LongInt(n) => Some(*n as f64),
            Variant::ULongInt(n) => Some(*n as f64),
            Variant::String(_) | Variant::AtomString(_) => {
                self.as_str().and_then(|s| s.trim().parse().ok())
            }
            _ => None,
        }
    }

    /// Truthiness, as the logical built-ins see it: numeric zero, empty
    /// text, and empty containers are false; dynamic and native entities
    /// are always true.
    pub fn to_boolean(&self) -> bool {
        match self {
            Variant::Undefined | Variant::Null => false,
            Variant::Boolean(b) => *b,
            Variant::Number(n) | Variant::LongDouble(n) => *n != 0.0,
            Variant::LongInt(n) => *n != 0,
            Variant::ULongInt(n) => *n != 0,
            Variant::Exception(a) | Variant::AtomString(a) => !a.as_str().is_empty(),
            Variant::String(s) => !s.as_str().is_empty(),
            Variant::BSequence(b) => !b.is_empty(),
            Variant::Dynamic { .. } | Variant::Native(_) => true,
            Variant::Object(_) => self.object_size().unwrap_or(0) > 0,
            Variant::Array(_) => self.array_size().unwrap_or(0) > 0,
            Variant::Set(_) => self.set_size().unwrap_or(0) > 0,
        }
    }

    /// Stringification for concat-string and text interpolation. Undefined
    /// contributes nothing; containers serialize to their eJSON form.
    pub fn stringify(&self) -> String {
        match self {
            Variant::Undefined => String::new(),
            Variant::Null => "null".to_owned(),
            Variant::Boolean(b) => b.to_string(),
            Variant::Number(n) | Variant::LongDouble(n) => format_number(*n),
            Variant::LongInt(n) => n.to_string(),
            Variant::ULongInt(n) => n.to_string(),
            Variant::Exception(a) | Variant::AtomString(a) => a.as_str().to_owned(),
            Variant::String(s) => s.as_str().to_owned(),
            Variant::BSequence(b) => {
                let mut out = String::with_capacity(b.len() * 2);
                for byte in b.iter() {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
            Variant::Dynamic { .. } => "<dynamic>".to_owned(),
            Variant::Native(_) => "<native>".to_owned(),
            Variant::Object(_) | Variant::Array(_) | Variant::Set(_) => {
                crate::serialize::to_json_string(self)
            }
        }
    }
}

/// Shortest round-trip form; integral values keep a trailing ".0"-free
/// rendering to match the eJSON number syntax.
fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        crate::compare::equals(self, other)
    }
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Undefined => f.write_str("undefined"),
            Variant::Dynamic { .. } => f.write_str("<dynamic>"),
            Variant::Native(_) => f.write_str("<native>"),
            _ => f.write_str(&self.stringify()),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stringify())
    }
}
