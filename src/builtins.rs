//! Built-in function library: global functions and receiver-style
//! methods.
//!
//! Arguments arrive already evaluated; macros (which need unevaluated
//! arguments) live in the macro engine, not here. Every function checks
//! its arity and operand types and fails with a message naming itself.

use crate::error::EvalError;
use crate::time;
use crate::value::Value;

/// Calls a global built-in. Returns `Ok(None)` when `name` is not a
/// built-in so the caller can report an unknown function.
pub(crate) fn call(name: &str, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
    let value = match name {
        "size" => {
            let [arg] = take::<1>(name, args)?;
            size(arg)?
        }
        "type" => {
            let [arg] = take::<1>(name, args)?;
            Value::String(arg.type_of().to_string())
        }
        "abs" => {
            let [arg] = take::<1>(name, args)?;
            abs(arg)?
        }
        "min" => {
            let [a, b] = take::<2>(name, args)?;
            extremum(a, b, std::cmp::Ordering::Less)?
        }
        "max" => {
            let [a, b] = take::<2>(name, args)?;
            extremum(a, b, std::cmp::Ordering::Greater)?
        }
        "floor" => {
            let [arg] = take::<1>(name, args)?;
            round_toward(arg, f64::floor, "floor")?
        }
        "ceil" => {
            let [arg] = take::<1>(name, args)?;
            round_toward(arg, f64::ceil, "ceil")?
        }
        "int" => {
            let [arg] = take::<1>(name, args)?;
            to_int(arg)?
        }
        "uint" => {
            let [arg] = take::<1>(name, args)?;
            to_uint(arg)?
        }
        "double" => {
            let [arg] = take::<1>(name, args)?;
            to_double(arg)?
        }
        "string" => {
            let [arg] = take::<1>(name, args)?;
            to_string(arg)?
        }
        "bytes" => {
            let [arg] = take::<1>(name, args)?;
            to_bytes(arg)?
        }
        "timestamp" => {
            let [arg] = take::<1>(name, args)?;
            match arg {
                Value::Timestamp(_) => arg,
                Value::String(s) => Value::Timestamp(time::parse_timestamp(&s)?),
                other => {
                    return Err(EvalError::ArgumentType {
                        function: "timestamp".into(),
                        expected: "a string",
                        got: other.type_of(),
                    })
                }
            }
        }
        "duration" => {
            let [arg] = take::<1>(name, args)?;
            match arg {
                Value::Duration(_) => arg,
                Value::String(s) => Value::Duration(time::parse_duration(&s)?),
                other => {
                    return Err(EvalError::ArgumentType {
                        function: "duration".into(),
                        expected: "a string",
                        got: other.type_of(),
                    })
                }
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Receiver-style dispatch: string methods, `x.size()`, and the
/// timestamp/duration accessors. `Ok(None)` means the name is not a
/// built-in method.
pub(crate) fn call_method(
    name: &str,
    receiver: Value,
    args: Vec<Value>,
) -> Result<Option<Value>, EvalError> {
    let value = match name {
        "contains" => {
            let [arg] = take::<1>(name, args)?;
            let (s, t) = string_pair(name, receiver, arg)?;
            Value::Bool(s.contains(&t))
        }
        "startsWith" => {
            let [arg] = take::<1>(name, args)?;
            let (s, t) = string_pair(name, receiver, arg)?;
            Value::Bool(s.starts_with(&t))
        }
        "endsWith" => {
            let [arg] = take::<1>(name, args)?;
            let (s, t) = string_pair(name, receiver, arg)?;
            Value::Bool(s.ends_with(&t))
        }
        "trim" => {
            take::<0>(name, args)?;
            match receiver {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => return Err(receiver_type(name, other)),
            }
        }
        "split" => {
            let [arg] = take::<1>(name, args)?;
            let (s, sep) = string_pair(name, receiver, arg)?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::from).collect()
            };
            Value::List(parts)
        }
        "size" => {
            take::<0>(name, args)?;
            size(receiver)?
        }
        _ => {
            // timestamp/duration accessors share the getX naming
            return accessor(name, receiver, args);
        }
    };
    Ok(Some(value))
}

fn accessor(name: &str, receiver: Value, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
    match receiver {
        Value::Timestamp(ts) => match time::timestamp_accessor(name, ts) {
            Some(v) => {
                take::<0>(name, args)?;
                Ok(Some(Value::Int(v)))
            }
            None => Ok(None),
        },
        Value::Duration(d) => match time::duration_accessor(name, d) {
            Some(v) => {
                take::<0>(name, args)?;
                Ok(Some(Value::Int(v)))
            }
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

// ----------------------------------------------------------------------
// Individual built-ins
// ----------------------------------------------------------------------

fn size(value: Value) -> Result<Value, EvalError> {
    let n = match &value {
        // code points, not bytes
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(EvalError::ArgumentType {
                function: "size".into(),
                expected: "a string, bytes, list, or map",
                got: other.type_of(),
            })
        }
    };
    Ok(Value::Int(n as i64))
}

fn abs(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or(EvalError::Overflow { op: "abs" }),
        Value::Uint(n) => Ok(Value::Uint(n)),
        Value::Double(d) => Ok(Value::Double(d.abs())),
        other => Err(EvalError::ArgumentType {
            function: "abs".into(),
            expected: "a number",
            got: other.type_of(),
        }),
    }
}

fn extremum(a: Value, b: Value, keep: std::cmp::Ordering) -> Result<Value, EvalError> {
    match a.cel_cmp(&b)? {
        // a NaN operand contaminates the result, as in IEEE min/max
        None => Ok(Value::Double(f64::NAN)),
        Some(ord) => Ok(if ord == keep { a } else { b }),
    }
}

fn round_toward(value: Value, f: fn(f64) -> f64, name: &str) -> Result<Value, EvalError> {
    match value {
        Value::Double(d) => Ok(Value::Double(f(d))),
        Value::Int(_) | Value::Uint(_) => Ok(value),
        other => Err(EvalError::ArgumentType {
            function: name.into(),
            expected: "a number",
            got: other.type_of(),
        }),
    }
}

fn to_int(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(_) => Ok(value),
        Value::Uint(n) => i64::try_from(n)
            .map(Value::Int)
            .map_err(|_| EvalError::NumericRange { function: "int", value: n.to_string() }),
        Value::Double(d) => {
            let truncated = d.trunc();
            if !truncated.is_finite()
                || truncated < i64::MIN as f64
                || truncated >= i64::MAX as f64
            {
                return Err(EvalError::NumericRange { function: "int", value: d.to_string() });
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::NumericRange { function: "int", value: s }),
        Value::Timestamp(ts) => Ok(Value::Int(ts.timestamp())),
        other => Err(EvalError::ArgumentType {
            function: "int".into(),
            expected: "a number, string, or timestamp",
            got: other.type_of(),
        }),
    }
}

fn to_uint(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Uint(_) => Ok(value),
        Value::Int(n) => u64::try_from(n)
            .map(Value::Uint)
            .map_err(|_| EvalError::NumericRange { function: "uint", value: n.to_string() }),
        Value::Double(d) => {
            let truncated = d.trunc();
            if !truncated.is_finite() || truncated < 0.0 || truncated >= u64::MAX as f64 {
                return Err(EvalError::NumericRange { function: "uint", value: d.to_string() });
            }
            Ok(Value::Uint(truncated as u64))
        }
        Value::String(s) => s
            .parse::<u64>()
            .map(Value::Uint)
            .map_err(|_| EvalError::NumericRange { function: "uint", value: s }),
        other => Err(EvalError::ArgumentType {
            function: "uint".into(),
            expected: "a number or string",
            got: other.type_of(),
        }),
    }
}

fn to_double(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Double(_) => Ok(value),
        Value::Int(n) => Ok(Value::Double(n as f64)),
        Value::Uint(n) => Ok(Value::Double(n as f64)),
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::NumericRange { function: "double", value: s }),
        other => Err(EvalError::ArgumentType {
            function: "double".into(),
            expected: "a number or string",
            got: other.type_of(),
        }),
    }
}

fn to_string(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::String(_) => Ok(value),
        Value::Bytes(b) => String::from_utf8(b)
            .map(Value::String)
            .map_err(|_| EvalError::InvalidUtf8),
        other => Ok(Value::String(other.to_display_string())),
    }
}

fn to_bytes(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Bytes(_) => Ok(value),
        Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let byte = match item {
                    Value::Int(n) if (0..=255).contains(&n) => n as u8,
                    Value::Uint(n) if n <= 255 => n as u8,
                    other => {
                        return Err(EvalError::ArgumentType {
                            function: "bytes".into(),
                            expected: "a list of ints in [0, 255]",
                            got: other.type_of(),
                        })
                    }
                };
                out.push(byte);
            }
            Ok(Value::Bytes(out))
        }
        other => Err(EvalError::ArgumentType {
            function: "bytes".into(),
            expected: "a string or list of ints",
            got: other.type_of(),
        }),
    }
}

// ----------------------------------------------------------------------
// Argument plumbing
// ----------------------------------------------------------------------

fn take<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    let got = args.len();
    args.try_into().map_err(|_| EvalError::Arity {
        function: name.to_string(),
        expected: N,
        got,
    })
}

fn string_pair(name: &str, receiver: Value, arg: Value) -> Result<(String, String), EvalError> {
    let s = match receiver {
        Value::String(s) => s,
        other => return Err(receiver_type(name, other)),
    };
    let t = match arg {
        Value::String(t) => t,
        other => {
            return Err(EvalError::ArgumentType {
                function: name.to_string(),
                expected: "a string",
                got: other.type_of(),
            })
        }
    };
    Ok((s, t))
}

fn receiver_type(name: &str, receiver: Value) -> EvalError {
    EvalError::ArgumentType {
        function: name.to_string(),
        expected: "a string receiver",
        got: receiver.type_of(),
    }
}
