//! Dynamic value conversion
//!
//! Narrows values produced by Lua evaluation into a closed set of
//! Rust-side shapes. Tables are classified as sequences or mappings by
//! probing for integer keys contiguous from 1.
//!
//! # Classification
//!
//! | Table keys             | Result                     |
//! |------------------------|----------------------------|
//! | none                   | empty `Mapping`            |
//! | `1..n`                 | `Sequence` of length n     |
//! | `1..n` + string keys   | `Sequence` (extras ignored) |
//! | `1, 3` (gap)           | `Mapping` keyed "1", "3"   |
//! | string keys only       | `Mapping`                  |
//!
//! Conversion never fails: values with no Rust-side counterpart
//! (functions, userdata, threads) pass through as `Opaque`, and so does a
//! table reached again through one of its own descendants.

use mlua::{Function, Table, Value};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::ffi::c_void;
use std::fmt;

/// A Lua value narrowed into a closed set of shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Nil,
    Bool(bool),
    String(String),
    Number(f64),
    Mapping(BTreeMap<String, DynamicValue>),
    Sequence(Vec<DynamicValue>),
    /// Functions, userdata and other runtime objects, kept as-is
    Opaque(Value),
}

impl DynamicValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[DynamicValue]> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Mapping(_) => "mapping",
            Self::Sequence(_) => "sequence",
            Self::Opaque(v) => v.type_name(),
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Mapping(m) => write!(f, "<mapping of {}>", m.len()),
            Self::Sequence(s) => write!(f, "<sequence of {}>", s.len()),
            Self::Opaque(v) => write!(f, "<{}>", v.type_name()),
        }
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Nil => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Mapping(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Opaque(v) => serializer.serialize_str(&format!("<{}>", v.type_name())),
        }
    }
}

/// Convert a runtime value into a [`DynamicValue`].
pub fn convert(value: &Value) -> DynamicValue {
    convert_value(value, &mut HashSet::new())
}

/// `ancestors` holds the tables on the current conversion path.
fn convert_value(value: &Value, ancestors: &mut HashSet<*const c_void>) -> DynamicValue {
    match value {
        Value::Nil => DynamicValue::Nil,
        Value::Boolean(b) => DynamicValue::Bool(*b),
        Value::Integer(i) => DynamicValue::Number(*i as f64),
        Value::Number(n) => DynamicValue::Number(*n),
        Value::String(s) => DynamicValue::String(s.to_string_lossy().to_string()),
        Value::Table(t) => convert_table(t, ancestors),
        other => DynamicValue::Opaque(other.clone()),
    }
}

fn convert_table(table: &Table, ancestors: &mut HashSet<*const c_void>) -> DynamicValue {
    let ptr = table.to_pointer();
    if !ancestors.insert(ptr) {
        return DynamicValue::Opaque(Value::Table(table.clone()));
    }

    let max_n = sequence_len(table);
    let converted = if max_n == 0 {
        let mut ret = BTreeMap::new();
        for (key, value) in table.pairs::<Value, Value>().flatten() {
            ret.insert(key_to_string(&key), convert_value(&value, ancestors));
        }
        DynamicValue::Mapping(ret)
    } else {
        let mut ret = Vec::with_capacity(max_n);
        for i in 1..=max_n {
            let item: Value = table.raw_get(i).unwrap_or(Value::Nil);
            ret.push(convert_value(&item, ancestors));
        }
        DynamicValue::Sequence(ret)
    };

    ancestors.remove(&ptr);
    converted
}

/// Length of the array portion of `table`: the largest `n` such that keys
/// `1..=n` are all present. Returns 0 when a positive integer key exists
/// beyond that run, so tables with holes are treated as mappings.
pub fn sequence_len(table: &Table) -> usize {
    let mut n: usize = 0;
    while !matches!(table.raw_get::<Value>(n + 1), Ok(Value::Nil) | Err(_)) {
        n += 1;
    }
    if n == 0 {
        return 0;
    }

    let has_gap = table
        .pairs::<Value, Value>()
        .flatten()
        .any(|(key, _)| matches!(key, Value::Integer(i) if i > n as i64));
    if has_gap {
        0
    } else {
        n
    }
}

/// Natural string form of a table key.
fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => format!("<{}>", other.type_name()),
    }
}

// ============================================================================
// Typed accessors
// ============================================================================
//
// Each accessor tries one target shape. `None` means "absent": a missing key
// and an explicit nil are indistinguishable, and both leave the target field
// at its default.

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        _ => None,
    }
}

/// Only genuine strings match; numbers are not coerced. Invalid UTF-8 is
/// replaced, the same as for hook commands.
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string_lossy().to_string()),
        _ => None,
    }
}

pub fn as_mapping(value: &Value) -> Option<BTreeMap<String, DynamicValue>> {
    match convert(value) {
        DynamicValue::Mapping(m) => Some(m),
        _ => None,
    }
}

pub fn as_sequence(value: &Value) -> Option<Vec<DynamicValue>> {
    match convert(value) {
        DynamicValue::Sequence(s) => Some(s),
        _ => None,
    }
}

pub fn as_callback(value: &Value) -> Option<Function> {
    match value {
        Value::Function(f) => Some(f.clone()),
        _ => None,
    }
}

/// Table-shaped, not yet converted.
pub fn as_table(value: &Value) -> Option<Table> {
    match value {
        Value::Table(t) => Some(t.clone()),
        _ => None,
    }
}
