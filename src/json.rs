//! Bridge between [`Value`] and `serde_json::Value`.
//!
//! This is how embedders feed JSON documents in as bindings and get
//! JSON-encodable results back out. JSON objects become insertion-ordered
//! maps with string keys; integral JSON numbers become ints, everything
//! else a double.

use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::error::EvalError;
use crate::value::{MapValue, Value};

/// Converts a JSON document to a CEL value.
pub fn to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::Uint(u)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(to_value).collect()),
        Json::Object(entries) => {
            let mut map = MapValue::new();
            for (key, value) in entries {
                map.insert(Value::String(key.clone()), to_value(value));
            }
            Value::Map(map)
        }
    }
}

/// Converts a CEL value to JSON. Timestamps and durations encode as
/// their canonical strings, bytes as a list of ints; non-finite doubles
/// have no JSON encoding and are rejected.
pub fn from_value(value: &Value) -> Result<Json, EvalError> {
    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::Number((*n).into()),
        Value::Uint(n) => Json::Number((*n).into()),
        Value::Double(d) => match Number::from_f64(*d) {
            Some(n) => Json::Number(n),
            None => {
                return Err(EvalError::Message(format!(
                    "double {d} has no JSON representation"
                )))
            }
        },
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|&byte| Json::from(byte as i64)).collect()),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_value(item)?);
            }
            Json::Array(out)
        }
        Value::Map(map) => {
            let mut out = JsonMap::new();
            for (key, val) in map.iter() {
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => other.to_display_string(),
                };
                out.insert(key, from_value(val)?);
            }
            Json::Object(out)
        }
        Value::Timestamp(_) | Value::Duration(_) => Json::String(value.to_display_string()),
    };
    Ok(json)
}

/// Values serialize through their JSON encoding, so a result can be fed
/// straight to any serde consumer. Non-encodable values (non-finite
/// doubles) fail serialization.
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match from_value(self) {
            Ok(json) => json.serialize(serializer),
            Err(err) => Err(serde::ser::Error::custom(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_map_by_integrality() {
        assert_eq!(to_value(&json!(3)), Value::Int(3));
        assert_eq!(to_value(&json!(-3)), Value::Int(-3));
        assert_eq!(to_value(&json!(18446744073709551615u64)), Value::Uint(u64::MAX));
        assert_eq!(to_value(&json!(1.5)), Value::Double(1.5));
    }

    #[test]
    fn json_objects_become_ordered_maps() {
        let value = to_value(&json!({"user": {"role": "admin", "level": 3}}));
        let Value::Map(map) = value else { panic!("expected map") };
        let Some(Value::Map(user)) = map.get(&Value::from("user")).cloned() else {
            panic!("expected nested map");
        };
        assert_eq!(user.get(&Value::from("role")), Some(&Value::from("admin")));
        assert_eq!(user.get(&Value::from("level")), Some(&Value::Int(3)));
    }

    #[test]
    fn json_arrays_become_lists() {
        assert_eq!(
            to_value(&json!([1, "two", null])),
            Value::List(vec![Value::Int(1), Value::from("two"), Value::Null])
        );
    }

    #[test]
    fn round_trips_plain_data() {
        let original = json!({"a": [1, 2.5, "x", true, null], "b": {"c": false}});
        let there = to_value(&original);
        let back = from_value(&there).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn bytes_encode_as_int_list() {
        assert_eq!(
            from_value(&Value::Bytes(vec![0, 255])).unwrap(),
            json!([0, 255])
        );
    }

    #[test]
    fn timestamps_and_durations_encode_as_strings() {
        let ts = crate::time::parse_timestamp("2023-01-01T00:00:00Z").unwrap();
        assert_eq!(
            from_value(&Value::Timestamp(ts)).unwrap(),
            json!("2023-01-01T00:00:00Z")
        );
        assert_eq!(
            from_value(&Value::Duration(chrono::Duration::minutes(90))).unwrap(),
            json!("1h30m0s")
        );
    }

    #[test]
    fn non_finite_doubles_are_rejected() {
        assert!(from_value(&Value::Double(f64::NAN)).is_err());
        assert!(from_value(&Value::Double(f64::INFINITY)).is_err());
    }

    #[test]
    fn values_serialize_through_serde() {
        let value = Value::List(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[1,\"x\"]");
    }

    #[test]
    fn non_string_map_keys_stringify() {
        let mut map = MapValue::new();
        map.insert(Value::Int(1), Value::from("one"));
        assert_eq!(from_value(&Value::Map(map)).unwrap(), json!({"1": "one"}));
    }
}
