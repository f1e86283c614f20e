//! JSON round-trip for the eJSON-compatible subset
//!
//! Containers and primitives map onto `serde_json::Value`; the tags JSON
//! cannot express degrade the way the text formatter does (byte sequences
//! to hex, dynamic/native to markers). Parsing maps integers onto longint /
//! ulongint and everything else onto the nearest tag.

use crate::value::Variant;
use serde_json::{Map, Number, Value as Json};

/// Serialize a variant to a `serde_json` value.
pub fn to_json(v: &Variant) -> Json {
    match v {
        Variant::Undefined | Variant::Null => Json::Null,
        Variant::Boolean(b) => Json::Bool(*b),
        Variant::Number(n) | Variant::LongDouble(n) => Number::from_f64(*n)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Variant::LongInt(n) => Json::Number((*n).into()),
        Variant::ULongInt(n) => Json::Number((*n).into()),
        Variant::Exception(a) | Variant::AtomString(a) => Json::String(a.as_str().to_owned()),
        Variant::String(s) => Json::String(s.as_str().to_owned()),
        Variant::BSequence(_) => Json::String(v.stringify()),
        Variant::Dynamic { .. } => Json::String("<dynamic>".to_owned()),
        Variant::Native(_) => Json::String("<native>".to_owned()),
        Variant::Object(_) => {
            let mut map = Map::new();
            for (k, member) in v.object_entries().unwrap_or_default() {
                map.insert(k, to_json(&member));
            }
            Json::Object(map)
        }
        Variant::Array(_) => Json::Array(
            v.array_members()
                .unwrap_or_default()
                .iter()
                .map(to_json)
                .collect(),
        ),
        Variant::Set(_) => Json::Array(
            v.set_members()
                .unwrap_or_default()
                .iter()
                .map(to_json)
                .collect(),
        ),
    }
}

/// Serialize a variant to JSON text.
pub fn to_json_string(v: &Variant) -> String {
    serde_json::to_string(&to_json(v)).unwrap_or_else(|_| "null".to_owned())
}

/// Build a variant from a `serde_json` value.
pub fn from_json(json: &Json) -> Variant {
    match json {
        Json::Null => Variant::Null,
        Json::Bool(b) => Variant::boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Variant::longint(i)
            } else if let Some(u) = n.as_u64() {
                Variant::ulongint(u)
            } else {
                Variant::number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Variant::string(s.clone()),
        Json::Array(items) => {
            let arr = Variant::array();
            for item in items {
                let _ = arr.array_append(from_json(item));
            }
            arr
        }
        Json::Object(map) => {
            let obj = Variant::object();
            for (k, item) in map {
                let _ = obj.object_set(k.clone(), from_json(item));
            }
            obj
        }
    }
}

/// Parse JSON text into a variant.
pub fn from_json_str(text: &str) -> Result<Variant, serde_json::Error> {
    Ok(from_json(&serde_json::from_str::<Json>(text)?))
}

impl serde::Serialize for Variant {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}
