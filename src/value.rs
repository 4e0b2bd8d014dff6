//! Runtime value domain.
//!
//! A closed tagged sum: every CEL runtime value is one of these variants,
//! and the operator kernel dispatches by exhaustive match on the tags.
//! Values are immutable after construction; sharing is by clone.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::EvalError;
use crate::time;

/// Signed duration with nanosecond precision, re-exported from chrono.
pub type Duration = chrono::Duration;

/// Instant with nanosecond precision, kept in UTC.
pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Null,
    List(Vec<Value>),
    Map(MapValue),
    Timestamp(Timestamp),
    Duration(Duration),
}

impl Value {
    /// Symbolic type tag, as returned by `type()` and used in error
    /// messages.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Null => "null_type",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Uint(_) | Value::Double(_))
    }

    /// CEL equality. Never fails: mismatched types compare unequal.
    ///
    /// Numerics compare by mathematical value across int/uint/double;
    /// NaN is unequal to everything including itself.
    pub fn cel_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Uint(b)) | (Value::Uint(b), Value::Int(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Uint(a), Value::Double(b)) | (Value::Double(b), Value::Uint(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.cel_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => a.entry_set_eq(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            _ => false,
        }
    }

    /// CEL ordering. `Ok(None)` means the operands are the right types
    /// but have no order (a NaN was involved); `Err` is a type error.
    pub fn cel_cmp(&self, other: &Value) -> Result<Option<Ordering>, EvalError> {
        let ord = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Uint(b)) => Some(cmp_int_uint(*a, *b)),
            (Value::Uint(a), Value::Int(b)) => Some(cmp_int_uint(*b, *a).reverse()),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Uint(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Uint(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            _ => {
                return Err(EvalError::NotComparable {
                    left: self.type_of(),
                    right: other.type_of(),
                })
            }
        };
        Ok(ord)
    }

    /// Canonical textual form: what `string(x)` produces and what the CLI
    /// prints. Strings render bare at the top level, quoted when nested.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.render_nested(),
        }
    }

    fn render_nested(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Uint(n) => n.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Bytes(b) => format_bytes(b),
            Value::Null => "null".to_string(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.render_nested()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.render_nested(), v.render_nested()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::Duration(d) => time::format_duration(*d),
        }
    }
}

/// Equality follows CEL semantics, so `Double(NAN) != Double(NAN)` and
/// `Int(1) == Uint(1)`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cel_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<MapValue> for Value {
    fn from(v: MapValue) -> Self {
        Value::Map(v)
    }
}

fn cmp_int_uint(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "+Inf".to_string() } else { "-Inf".to_string() }
    } else {
        // shortest round-trip form
        format!("{d}")
    }
}

fn format_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b\"");
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('"');
    out
}

/// Association from value to value, preserving insertion order.
///
/// Entries are kept in a vector: CEL maps are small, iteration order must
/// follow insertion, and key equality is CEL equality (`1 == 1u`), which
/// rules out the std hash map without a wrapper key type. Inserting an
/// existing key overwrites in place.
#[derive(Debug, Clone, Default)]
pub struct MapValue {
    entries: Vec<(Value, Value)>,
}

impl MapValue {
    pub fn new() -> Self {
        MapValue { entries: Vec::new() }
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k.cel_eq(&key)) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.cel_eq(key))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.iter().any(|(k, _)| k.cel_eq(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    fn entry_set_eq(&self, other: &MapValue) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov.cel_eq(v)))
    }
}

impl FromIterator<(Value, Value)> for MapValue {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = MapValue::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
