//! Metadata normalization.
//!
//! Extractors hand back loosely typed values: fixed-width integers straight
//! out of a file header, `f32` readings that may be NaN, byte strings, opaque
//! handles into a binary container. None of that can go into a catalog record
//! as-is, because the record's metadata is a JSON document. Two independent
//! passes fix this, and they run at different points in the pipeline:
//!
//! 1. [`parse_strings`] runs right after raw extraction on analyzer output,
//!    where every value arrives as a string. It turns `"true"`/`"false"` into
//!    booleans and numeric-looking strings into numbers, and drops ignored keys.
//! 2. [`normalize`] runs right before the record is created and makes the
//!    mapping JSON-safe.
//!
//! ## JSON-safety rules
//!
//! Applied per value, first match wins:
//!
//! | Input | Output |
//! |---|---|
//! | falsy: null, `false`, `0`, `0.0`, empty string/bytes/list/map | the string `"None"` |
//! | nested map | normalized recursively |
//! | any fixed-width integer | JSON integer |
//! | NaN or ±infinity | the string `"NaN"` |
//! | other float | JSON float |
//! | `true` | JSON boolean |
//! | list / native buffer | JSON array of normalized elements |
//! | binary reference | key dropped |
//! | byte string | UTF-8 text (lossy) |
//!
//! The falsy rule is deliberate: every key the extractor reported stays
//! visible in the record with a printable value, even when that value is
//! zero or `false`. Catalog users search on key presence, and `"None"` reads
//! better in the catalog UI than a JSON `null`.
//!
//! Inside lists only the representation rules apply (null → `"None"`,
//! NaN → `"NaN"`, binary references dropped); a `0` in a list stays `0` so
//! that numeric buffers keep their shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("ignore keys must be a string or a list of strings, got {0}")]
    InvalidIgnoreKeys(String),
}

/// Raw extractor output: loosely typed values keyed by name.
pub type RawMetadata = BTreeMap<String, RawValue>;

/// JSON-safe metadata ready to be embedded in a record.
pub type ExtractedMetadata = Map<String, Value>;

/// A value as an extractor produced it, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<RawValue>),
    Map(RawMetadata),
    /// Handle into a binary container (e.g. an object reference inside an
    /// HDF5-style file). Meaningless outside the file, so never exported.
    BinaryRef(String),
}

impl RawValue {
    /// Python-style truthiness: null, false, zero and empty containers.
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::I8(n) => *n == 0,
            Self::I16(n) => *n == 0,
            Self::I32(n) => *n == 0,
            Self::I64(n) => *n == 0,
            Self::U8(n) => *n == 0,
            Self::U16(n) => *n == 0,
            Self::U32(n) => *n == 0,
            Self::U64(n) => *n == 0,
            Self::F32(f) => *f == 0.0,
            Self::F64(f) => *f == 0.0,
            Self::Str(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
            Self::BinaryRef(_) => false,
        }
    }

    fn as_integer(&self) -> Option<Value> {
        let n = match self {
            Self::I8(n) => Number::from(*n),
            Self::I16(n) => Number::from(*n),
            Self::I32(n) => Number::from(*n),
            Self::I64(n) => Number::from(*n),
            Self::U8(n) => Number::from(*n),
            Self::U16(n) => Number::from(*n),
            Self::U32(n) => Number::from(*n),
            Self::U64(n) => Number::from(*n),
            _ => return None,
        };
        Some(Value::Number(n))
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Self::F32(f) => Some(f64::from(*f)),
            Self::F64(f) => Some(*f),
            _ => None,
        }
    }
}

macro_rules! raw_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for RawValue {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        })*
    };
}

raw_from! {
    bool => Bool,
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
    String => Str,
    Vec<u8> => Bytes,
    Vec<RawValue> => List,
    RawMetadata => Map,
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Value> for RawValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Self::U64(u)
                } else {
                    Self::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(raw_from_json(map)),
        }
    }
}

/// Lift a JSON object into raw metadata so it can go through [`normalize`].
pub fn raw_from_json(map: Map<String, Value>) -> RawMetadata {
    map.into_iter().map(|(k, v)| (k, RawValue::from(v))).collect()
}

/// Make extractor output JSON-safe. See the [module docs](self) for the rules.
pub fn normalize(raw: RawMetadata) -> ExtractedMetadata {
    let mut clean = Map::new();
    for (key, value) in raw {
        if let Some(v) = normalize_value(value) {
            clean.insert(key, v);
        }
    }
    clean
}

fn normalize_value(value: RawValue) -> Option<Value> {
    if value.is_falsy() {
        return Some(Value::String("None".to_string()));
    }
    if let Some(int) = value.as_integer() {
        return Some(int);
    }
    if let Some(f) = value.as_float() {
        return Some(float_value(f));
    }
    match value {
        RawValue::Map(map) => Some(Value::Object(normalize(map))),
        RawValue::Bool(b) => Some(Value::Bool(b)),
        RawValue::List(items) => Some(Value::Array(
            items.into_iter().filter_map(normalize_element).collect(),
        )),
        RawValue::BinaryRef(_) => None,
        RawValue::Bytes(bytes) => Some(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        )),
        RawValue::Str(s) => Some(Value::String(s)),
        // Falsy, integer and float variants were handled above.
        _ => None,
    }
}

/// Normalize a list element: representation rules only, no falsy rewrite.
fn normalize_element(value: RawValue) -> Option<Value> {
    match value {
        RawValue::Null => Some(Value::String("None".to_string())),
        RawValue::Bool(b) => Some(Value::Bool(b)),
        RawValue::Map(map) => Some(Value::Object(normalize(map))),
        RawValue::List(items) => Some(Value::Array(
            items.into_iter().filter_map(normalize_element).collect(),
        )),
        RawValue::Str(s) => Some(Value::String(s)),
        RawValue::Bytes(bytes) => Some(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        )),
        RawValue::BinaryRef(_) => None,
        other => {
            if let Some(int) = other.as_integer() {
                return Some(int);
            }
            other.as_float().map(float_value)
        }
    }
}

fn float_value(f: f64) -> Value {
    match Number::from_f64(f) {
        Some(n) if f.is_finite() => Value::Number(n),
        _ => Value::String("NaN".to_string()),
    }
}

// =============================================================================
// String-typing pass
// =============================================================================

/// Keys to drop during [`parse_strings`].
///
/// Deserializes from either a single string or a list of strings, so config
/// files can write `ignore_keys = "resourceName"` or a full list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IgnoreKeysInput", into = "Vec<String>")]
pub struct IgnoreKeys(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum IgnoreKeysInput {
    One(String),
    Many(Vec<String>),
}

impl From<IgnoreKeysInput> for IgnoreKeys {
    fn from(input: IgnoreKeysInput) -> Self {
        match input {
            IgnoreKeysInput::One(key) => Self::from(key.as_str()),
            IgnoreKeysInput::Many(keys) => Self(keys),
        }
    }
}

impl From<IgnoreKeys> for Vec<String> {
    fn from(keys: IgnoreKeys) -> Self {
        keys.0
    }
}

impl From<&str> for IgnoreKeys {
    fn from(key: &str) -> Self {
        if key.is_empty() {
            Self::default()
        } else {
            Self(vec![key.to_string()])
        }
    }
}

impl From<Vec<String>> for IgnoreKeys {
    fn from(keys: Vec<String>) -> Self {
        Self(keys)
    }
}

impl IgnoreKeys {
    /// Interpret a loosely typed ignore-list.
    ///
    /// Accepts null (nothing ignored), a string, or an array of strings.
    /// Anything else is a usage error.
    pub fn from_json(value: &Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::String(key) => Ok(Self::from(key.as_str())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(String::from).ok_or_else(|| {
                        NormalizeError::InvalidIgnoreKeys(format!("list containing {item}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            other => Err(NormalizeError::InvalidIgnoreKeys(other.to_string())),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }
}

/// Give string values their natural JSON types and drop ignored keys.
///
/// - `"true"` / `"false"` (any case) → boolean
/// - numeric strings → integer when the value has no fractional part,
///   float otherwise (`"3.0"` → `3`, `"3.5"` → `3.5`)
/// - anything else, including `"nan"` and `"inf"`, stays a string
///
/// Lists are typed element by element; nested maps recurse with the same
/// ignore-list.
pub fn parse_strings(raw: &Map<String, Value>, ignore: &IgnoreKeys) -> Map<String, Value> {
    let mut clean = Map::new();
    for (key, value) in raw {
        if ignore.contains(key) {
            continue;
        }
        let typed = match value {
            Value::String(s) => parse_str(s),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => parse_str(s),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            Value::Object(map) => Value::Object(parse_strings(map, ignore)),
            other => other.clone(),
        };
        clean.insert(key.clone(), typed);
    }
    clean
}

fn parse_str(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    let trimmed = s.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::from(f as i64)
            } else {
                Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(s.to_string()))
            }
        }
        _ => Value::String(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: Vec<(&str, RawValue)>) -> RawMetadata {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn assert_json_safe(value: &Value) {
        match value {
            Value::Null => panic!("null survived normalization"),
            Value::Number(n) => assert!(n.as_f64().is_some_and(f64::is_finite)),
            Value::Array(items) => items.iter().for_each(assert_json_safe),
            Value::Object(map) => map.values().for_each(assert_json_safe),
            Value::Bool(_) | Value::String(_) => {}
        }
    }

    // =========================================================================
    // normalize()
    // =========================================================================

    #[test]
    fn fixed_width_integers_become_plain_integers() {
        let out = normalize(raw(vec![
            ("width", RawValue::U16(1024)),
            ("offset", RawValue::I8(-3)),
            ("frames", RawValue::U64(u64::MAX)),
        ]));
        assert_eq!(out["width"], json!(1024));
        assert_eq!(out["offset"], json!(-3));
        assert_eq!(out["frames"], json!(u64::MAX));
    }

    #[test]
    fn non_finite_floats_become_nan_string() {
        let out = normalize(raw(vec![
            ("a", RawValue::F64(f64::NAN)),
            ("b", RawValue::F32(f32::INFINITY)),
            ("c", RawValue::F64(f64::NEG_INFINITY)),
        ]));
        assert_eq!(out["a"], json!("NaN"));
        assert_eq!(out["b"], json!("NaN"));
        assert_eq!(out["c"], json!("NaN"));
    }

    #[test]
    fn finite_floats_pass_as_floats() {
        let out = normalize(raw(vec![("dwell", RawValue::F64(2.5))]));
        assert_eq!(out["dwell"], json!(2.5));
    }

    #[test]
    fn falsy_values_become_none_string() {
        let out = normalize(raw(vec![
            ("null", RawValue::Null),
            ("zero", RawValue::I32(0)),
            ("fzero", RawValue::F32(0.0)),
            ("no", RawValue::Bool(false)),
            ("empty", RawValue::Str(String::new())),
            ("list", RawValue::List(vec![])),
            ("map", RawValue::Map(RawMetadata::new())),
            ("bytes", RawValue::Bytes(vec![])),
        ]));
        for key in ["null", "zero", "fzero", "no", "empty", "list", "map", "bytes"] {
            assert_eq!(out[key], json!("None"), "key {key}");
        }
    }

    #[test]
    fn true_stays_boolean() {
        let out = normalize(raw(vec![("ok", RawValue::Bool(true))]));
        assert_eq!(out["ok"], json!(true));
    }

    #[test]
    fn binary_references_are_dropped() {
        let out = normalize(raw(vec![
            ("ref", RawValue::BinaryRef("<HDF5 object reference>".into())),
            ("kept", RawValue::I32(1)),
        ]));
        assert!(!out.contains_key("ref"));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn byte_strings_are_decoded() {
        let out = normalize(raw(vec![("units", RawValue::Bytes(b"nm".to_vec()))]));
        assert_eq!(out["units"], json!("nm"));
    }

    #[test]
    fn buffers_become_arrays_keeping_zeros() {
        let out = normalize(raw(vec![(
            "shape",
            RawValue::List(vec![
                RawValue::U32(0),
                RawValue::U32(512),
                RawValue::F32(f32::NAN),
                RawValue::Null,
                RawValue::BinaryRef("x".into()),
            ]),
        )]));
        assert_eq!(out["shape"], json!([0, 512, "NaN", "None"]));
    }

    #[test]
    fn nested_maps_are_normalized_recursively() {
        let mut inner = RawMetadata::new();
        inner.insert("gain".into(), RawValue::F64(f64::INFINITY));
        inner.insert("handle".into(), RawValue::BinaryRef("r".into()));
        inner.insert("bits".into(), RawValue::U8(12));
        let out = normalize(raw(vec![("detector", RawValue::Map(inner))]));
        assert_eq!(out["detector"], json!({"gain": "NaN", "bits": 12}));
    }

    #[test]
    fn normalized_output_is_always_json_safe() {
        let mut nested = RawMetadata::new();
        nested.insert("x".into(), RawValue::F64(f64::NAN));
        nested.insert("y".into(), RawValue::Null);
        let out = normalize(raw(vec![
            ("a", RawValue::F32(f32::NEG_INFINITY)),
            ("b", RawValue::I64(i64::MIN)),
            ("c", RawValue::Bool(false)),
            ("d", RawValue::List(vec![RawValue::F64(f64::NAN), RawValue::Null])),
            ("e", RawValue::Map(nested)),
        ]));
        let value = Value::Object(out);
        assert_json_safe(&value);
        assert!(serde_json::to_string(&value).is_ok());
    }

    #[test]
    fn json_values_lift_into_raw() {
        let lifted = raw_from_json(
            json!({"n": 3, "f": 1.5, "s": "x", "l": [1], "m": {"k": null}})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(lifted["n"], RawValue::I64(3));
        assert_eq!(lifted["f"], RawValue::F64(1.5));
        assert!(matches!(lifted["m"], RawValue::Map(_)));
    }

    // =========================================================================
    // parse_strings()
    // =========================================================================

    #[test]
    fn string_typing_converts_booleans_and_numbers() {
        let raw = json!({
            "flag": "True",
            "off": "FALSE",
            "whole": "3.0",
            "frac": "3.5",
            "count": "42",
            "name": "hello",
        });
        let out = parse_strings(raw.as_object().unwrap(), &IgnoreKeys::default());
        assert_eq!(out["flag"], json!(true));
        assert_eq!(out["off"], json!(false));
        assert_eq!(out["whole"], json!(3));
        assert!(out["whole"].is_i64());
        assert_eq!(out["frac"], json!(3.5));
        assert_eq!(out["count"], json!(42));
        assert_eq!(out["name"], json!("hello"));
    }

    #[test]
    fn string_typing_leaves_nan_and_inf_as_strings() {
        let raw = json!({"a": "nan", "b": "inf", "c": ""});
        let out = parse_strings(raw.as_object().unwrap(), &IgnoreKeys::default());
        assert_eq!(out["a"], json!("nan"));
        assert_eq!(out["b"], json!("inf"));
        assert_eq!(out["c"], json!(""));
    }

    #[test]
    fn ignored_keys_are_absent() {
        let raw = json!({"X-Parsed-By": ["a"], "resourceName": "f.tif", "Pages": "2"});
        let ignore = IgnoreKeys::from(vec!["X-Parsed-By".to_string(), "resourceName".to_string()]);
        let out = parse_strings(raw.as_object().unwrap(), &ignore);
        assert!(!out.contains_key("X-Parsed-By"));
        assert!(!out.contains_key("resourceName"));
        assert_eq!(out["Pages"], json!(2));
    }

    #[test]
    fn single_string_ignore_key_is_accepted() {
        let raw = json!({"drop": "1", "keep": "2"});
        let out = parse_strings(raw.as_object().unwrap(), &IgnoreKeys::from("drop"));
        assert_eq!(out.len(), 1);
        assert_eq!(out["keep"], json!(2));
    }

    #[test]
    fn lists_and_nested_maps_are_typed() {
        let raw = json!({"dims": ["512", "512.0", "x"], "stage": {"tilt": "1.25", "drop": "y"}});
        let out = parse_strings(raw.as_object().unwrap(), &IgnoreKeys::from("drop"));
        assert_eq!(out["dims"], json!([512, 512, "x"]));
        assert_eq!(out["stage"], json!({"tilt": 1.25}));
    }

    #[test]
    fn ignore_keys_from_json_accepts_string_list_and_null() {
        assert_eq!(IgnoreKeys::from_json(&json!("a")).unwrap().keys(), ["a"]);
        assert_eq!(
            IgnoreKeys::from_json(&json!(["a", "b"])).unwrap().keys(),
            ["a", "b"]
        );
        assert!(IgnoreKeys::from_json(&Value::Null).unwrap().keys().is_empty());
    }

    #[test]
    fn ignore_keys_from_json_rejects_other_types() {
        assert!(matches!(
            IgnoreKeys::from_json(&json!(42)),
            Err(NormalizeError::InvalidIgnoreKeys(_))
        ));
        assert!(matches!(
            IgnoreKeys::from_json(&json!({"a": 1})),
            Err(NormalizeError::InvalidIgnoreKeys(_))
        ));
        assert!(IgnoreKeys::from_json(&json!(["a", 1])).is_err());
    }

    #[test]
    fn ignore_keys_deserialize_from_toml_string_or_list() {
        #[derive(Deserialize)]
        struct Holder {
            keys: IgnoreKeys,
        }
        let one: Holder = toml::from_str(r#"keys = "resourceName""#).unwrap();
        assert_eq!(one.keys.keys(), ["resourceName"]);
        let many: Holder = toml::from_str(r#"keys = ["a", "b"]"#).unwrap();
        assert_eq!(many.keys.keys(), ["a", "b"]);
        assert!(toml::from_str::<Holder>("keys = 3").is_err());
    }
}
