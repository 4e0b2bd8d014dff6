//! Operator kernel: arithmetic, comparison, membership, and unary
//! application over [`Value`] pairs.
//!
//! Every operation is an exhaustive match on the operand tags, so an
//! unsupported combination is a compile-visible fall-through to a type
//! error rather than a silent coercion. Arithmetic is checked: 64-bit
//! overflow is a runtime error, never a wrap.

use std::cmp::Ordering;

use crate::ast::BinaryOp;
use crate::error::EvalError;
use crate::time;
use crate::value::Value;

/// Applies any binary operator except `&&`/`||`, which short-circuit in
/// the interpreter and never reach the kernel.
pub fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => sub(left, right),
        BinaryOp::Mul => mul(left, right),
        BinaryOp::Div => div(left, right),
        BinaryOp::Rem => rem(left, right),
        BinaryOp::Eq => Ok(Value::Bool(left.cel_eq(&right))),
        BinaryOp::Neq => Ok(Value::Bool(!left.cel_eq(&right))),
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => compare(op, left, right),
        BinaryOp::In => membership(left, right),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops are interpreter-level"),
    }
}

/// Numeric operand pairing. An int operand meets a uint operand on the
/// uint side when its value fits, which is how integer literals adapt to
/// the other operand's type; everything else stays strictly typed.
enum NumPair {
    Ints(i64, i64),
    Uints(u64, u64),
    Doubles(f64, f64),
    Other(Value, Value),
}

fn numeric_pair(left: Value, right: Value) -> NumPair {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => NumPair::Ints(a, b),
        (Value::Uint(a), Value::Uint(b)) => NumPair::Uints(a, b),
        (Value::Double(a), Value::Double(b)) => NumPair::Doubles(a, b),
        (Value::Int(a), Value::Uint(b)) if a >= 0 => NumPair::Uints(a as u64, b),
        (Value::Uint(a), Value::Int(b)) if b >= 0 => NumPair::Uints(a, b as u64),
        (l, r) => NumPair::Other(l, r),
    }
}

fn type_mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::UnsupportedBinary {
        op: op.symbol(),
        left: left.type_of(),
        right: right.type_of(),
    }
}

fn add(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::Bytes(mut a), Value::Bytes(b)) => {
            a.extend_from_slice(&b);
            Ok(Value::Bytes(a))
        }
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Value::Timestamp(ts), Value::Duration(d)) | (Value::Duration(d), Value::Timestamp(ts)) => {
            ts.checked_add_signed(d)
                .map(Value::Timestamp)
                .ok_or(EvalError::Overflow { op: "+" })
        }
        (Value::Duration(a), Value::Duration(b)) => a
            .checked_add(&b)
            .map(Value::Duration)
            .ok_or(EvalError::Overflow { op: "+" }),
        (l, r) => match numeric_pair(l, r) {
            NumPair::Ints(a, b) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow { op: "+" }),
            NumPair::Uints(a, b) => a
                .checked_add(b)
                .map(Value::Uint)
                .ok_or(EvalError::Overflow { op: "+" }),
            NumPair::Doubles(a, b) => Ok(Value::Double(a + b)),
            NumPair::Other(l, r) => Err(type_mismatch(BinaryOp::Add, &l, &r)),
        },
    }
}

fn sub(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Timestamp(ts), Value::Duration(d)) => ts
            .checked_sub_signed(d)
            .map(Value::Timestamp)
            .ok_or(EvalError::Overflow { op: "-" }),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(Value::Duration(a - b)),
        (Value::Duration(a), Value::Duration(b)) => a
            .checked_sub(&b)
            .map(Value::Duration)
            .ok_or(EvalError::Overflow { op: "-" }),
        (l, r) => match numeric_pair(l, r) {
            NumPair::Ints(a, b) => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow { op: "-" }),
            NumPair::Uints(a, b) => a
                .checked_sub(b)
                .map(Value::Uint)
                .ok_or(EvalError::Overflow { op: "-" }),
            NumPair::Doubles(a, b) => Ok(Value::Double(a - b)),
            NumPair::Other(l, r) => Err(type_mismatch(BinaryOp::Sub, &l, &r)),
        },
    }
}

fn mul(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Duration(d), other) | (other, Value::Duration(d))
            if matches!(other, Value::Int(_) | Value::Uint(_)) =>
        {
            let factor = match other {
                Value::Int(n) => n as i128,
                Value::Uint(n) => n as i128,
                _ => unreachable!(),
            };
            time::total_nanos(d)
                .checked_mul(factor)
                .and_then(time::duration_from_nanos)
                .map(Value::Duration)
                .ok_or(EvalError::Overflow { op: "*" })
        }
        (l, r) => match numeric_pair(l, r) {
            NumPair::Ints(a, b) => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow { op: "*" }),
            NumPair::Uints(a, b) => a
                .checked_mul(b)
                .map(Value::Uint)
                .ok_or(EvalError::Overflow { op: "*" }),
            NumPair::Doubles(a, b) => Ok(Value::Double(a * b)),
            NumPair::Other(l, r) => Err(type_mismatch(BinaryOp::Mul, &l, &r)),
        },
    }
}

fn div(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Duration(d), Value::Int(n)) => {
            if n == 0 {
                return Err(EvalError::DivisionByZero);
            }
            time::total_nanos(d)
                .checked_div(n as i128)
                .and_then(time::duration_from_nanos)
                .map(Value::Duration)
                .ok_or(EvalError::Overflow { op: "/" })
        }
        (l, r) => match numeric_pair(l, r) {
            NumPair::Ints(a, b) => {
                if b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                // truncates toward zero; i64::MIN / -1 overflows
                a.checked_div(b)
                    .map(Value::Int)
                    .ok_or(EvalError::Overflow { op: "/" })
            }
            NumPair::Uints(a, b) => {
                if b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Uint(a / b))
            }
            // IEEE semantics: double division by zero yields an infinity
            NumPair::Doubles(a, b) => Ok(Value::Double(a / b)),
            NumPair::Other(l, r) => Err(type_mismatch(BinaryOp::Div, &l, &r)),
        },
    }
}

fn rem(left: Value, right: Value) -> Result<Value, EvalError> {
    match numeric_pair(left, right) {
        NumPair::Ints(a, b) => {
            if b == 0 {
                return Err(EvalError::ModuloByZero);
            }
            // remainder takes the sign of the dividend
            a.checked_rem(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow { op: "%" })
        }
        NumPair::Uints(a, b) => {
            if b == 0 {
                return Err(EvalError::ModuloByZero);
            }
            Ok(Value::Uint(a % b))
        }
        NumPair::Doubles(a, b) => Err(type_mismatch(
            BinaryOp::Rem,
            &Value::Double(a),
            &Value::Double(b),
        )),
        NumPair::Other(l, r) => Err(type_mismatch(BinaryOp::Rem, &l, &r)),
    }
}

fn compare(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let ord = left.cel_cmp(&right)?;
    let result = match ord {
        // a NaN operand: every ordering comparison is false
        None => false,
        Some(ord) => match op {
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Lte => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::Gte => ord != Ordering::Less,
            _ => unreachable!(),
        },
    };
    Ok(Value::Bool(result))
}

fn membership(needle: Value, haystack: Value) -> Result<Value, EvalError> {
    match haystack {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.cel_eq(&needle)))),
        Value::Map(map) => Ok(Value::Bool(map.contains_key(&needle))),
        other => Err(EvalError::UnsupportedBinary {
            op: "in",
            left: needle.type_of(),
            right: other.type_of(),
        }),
    }
}

/// Stacked `-` with parity folding: an even count checks the operand is
/// negatable and returns it unchanged, an odd count negates once.
pub fn negate(value: Value, count: u32) -> Result<Value, EvalError> {
    let odd = count % 2 == 1;
    match value {
        Value::Int(n) => {
            if odd {
                n.checked_neg()
                    .map(Value::Int)
                    .ok_or(EvalError::Overflow { op: "-" })
            } else {
                Ok(Value::Int(n))
            }
        }
        Value::Double(d) => Ok(Value::Double(if odd { -d } else { d })),
        Value::Duration(d) => {
            if odd {
                time::duration_from_nanos(-time::total_nanos(d))
                    .map(Value::Duration)
                    .ok_or(EvalError::Overflow { op: "-" })
            } else {
                Ok(Value::Duration(d))
            }
        }
        other => Err(EvalError::UnsupportedUnary { op: "-", operand: other.type_of() }),
    }
}

/// Stacked `!` with parity folding. `!null` is true, so null enters the
/// fold as false.
pub fn logical_not(value: Value, count: u32) -> Result<Value, EvalError> {
    let base = match value {
        Value::Bool(b) => b,
        Value::Null => false,
        other => {
            return Err(EvalError::UnsupportedUnary { op: "!", operand: other.type_of() })
        }
    };
    Ok(Value::Bool(if count % 2 == 1 { !base } else { base }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapValue;
    use chrono::Duration;

    fn bin(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
        apply_binary(op, l, r)
    }

    #[test]
    fn int_arithmetic() {
        assert_eq!(bin(BinaryOp::Add, Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(bin(BinaryOp::Sub, Value::Int(2), Value::Int(3)).unwrap(), Value::Int(-1));
        assert_eq!(bin(BinaryOp::Mul, Value::Int(4), Value::Int(3)).unwrap(), Value::Int(12));
    }

    #[test]
    fn int_division_truncates_toward_zero() {
        assert_eq!(bin(BinaryOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(bin(BinaryOp::Div, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-3));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            bin(BinaryOp::Div, Value::Int(1), Value::Int(0)).unwrap_err(),
            EvalError::DivisionByZero
        );
        assert_eq!(
            bin(BinaryOp::Rem, Value::Int(1), Value::Int(0)).unwrap_err(),
            EvalError::ModuloByZero
        );
    }

    #[test]
    fn min_int_divided_by_minus_one_overflows() {
        assert_eq!(
            bin(BinaryOp::Div, Value::Int(i64::MIN), Value::Int(-1)).unwrap_err(),
            EvalError::Overflow { op: "/" }
        );
    }

    #[test]
    fn int_overflow_is_an_error_not_a_wrap() {
        assert_eq!(
            bin(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1)).unwrap_err(),
            EvalError::Overflow { op: "+" }
        );
        assert_eq!(
            bin(BinaryOp::Mul, Value::Uint(u64::MAX), Value::Uint(2)).unwrap_err(),
            EvalError::Overflow { op: "*" }
        );
    }

    #[test]
    fn uint_subtraction_below_zero_overflows() {
        assert_eq!(
            bin(BinaryOp::Sub, Value::Uint(1), Value::Uint(2)).unwrap_err(),
            EvalError::Overflow { op: "-" }
        );
    }

    #[test]
    fn remainder_takes_sign_of_dividend() {
        assert_eq!(bin(BinaryOp::Rem, Value::Int(7), Value::Int(3)).unwrap(), Value::Int(1));
        assert_eq!(bin(BinaryOp::Rem, Value::Int(-7), Value::Int(3)).unwrap(), Value::Int(-1));
    }

    #[test]
    fn mixed_int_double_arithmetic_is_a_type_error() {
        let err = bin(BinaryOp::Add, Value::Int(1), Value::Double(2.0)).unwrap_err();
        assert_eq!(err, EvalError::UnsupportedBinary { op: "+", left: "int", right: "double" });
    }

    #[test]
    fn nonnegative_int_adapts_to_uint_operand() {
        assert_eq!(bin(BinaryOp::Add, Value::Int(1), Value::Uint(2)).unwrap(), Value::Uint(3));
        assert_eq!(bin(BinaryOp::Mul, Value::Uint(2), Value::Int(3)).unwrap(), Value::Uint(6));
        assert!(bin(BinaryOp::Add, Value::Int(-1), Value::Uint(2)).is_err());
    }

    #[test]
    fn string_and_bytes_concatenation() {
        assert_eq!(
            bin(BinaryOp::Add, Value::from("foo"), Value::from("bar")).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(
            bin(BinaryOp::Add, Value::Bytes(vec![1]), Value::Bytes(vec![2])).unwrap(),
            Value::Bytes(vec![1, 2])
        );
    }

    #[test]
    fn list_concatenation() {
        assert_eq!(
            bin(
                BinaryOp::Add,
                Value::List(vec![Value::Int(1)]),
                Value::List(vec![Value::from("x")])
            )
            .unwrap(),
            Value::List(vec![Value::Int(1), Value::from("x")])
        );
    }

    #[test]
    fn timestamp_and_duration_arithmetic() {
        let ts = crate::time::parse_timestamp("2023-01-01T00:00:00Z").unwrap();
        let later = crate::time::parse_timestamp("2023-01-01T01:00:00Z").unwrap();
        let hour = Duration::hours(1);
        assert_eq!(
            bin(BinaryOp::Add, Value::Timestamp(ts), Value::Duration(hour)).unwrap(),
            Value::Timestamp(later)
        );
        assert_eq!(
            bin(BinaryOp::Sub, Value::Timestamp(later), Value::Timestamp(ts)).unwrap(),
            Value::Duration(hour)
        );
        assert_eq!(
            bin(BinaryOp::Sub, Value::Timestamp(later), Value::Duration(hour)).unwrap(),
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn duration_scaling() {
        let m30 = Duration::minutes(30);
        assert_eq!(
            bin(BinaryOp::Mul, Value::Duration(m30), Value::Int(2)).unwrap(),
            Value::Duration(Duration::hours(1))
        );
        assert_eq!(
            bin(BinaryOp::Div, Value::Duration(m30), Value::Int(2)).unwrap(),
            Value::Duration(Duration::minutes(15))
        );
        assert_eq!(
            bin(BinaryOp::Div, Value::Duration(m30), Value::Int(0)).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn double_division_by_zero_follows_ieee() {
        let Value::Double(d) =
            bin(BinaryOp::Div, Value::Double(1.0), Value::Double(0.0)).unwrap()
        else {
            panic!("expected double");
        };
        assert!(d.is_infinite());
    }

    #[test]
    fn comparisons_cross_numeric_types() {
        assert_eq!(bin(BinaryOp::Lt, Value::Int(1), Value::Double(1.5)).unwrap(), Value::Bool(true));
        assert_eq!(bin(BinaryOp::Gte, Value::Uint(2), Value::Int(2)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn comparison_on_incomparable_types_is_a_type_error() {
        let err = bin(BinaryOp::Gt, Value::from("a"), Value::Int(5)).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn nan_comparisons_are_all_false() {
        for op in [BinaryOp::Lt, BinaryOp::Lte, BinaryOp::Gt, BinaryOp::Gte] {
            assert_eq!(
                bin(op, Value::Double(f64::NAN), Value::Double(1.0)).unwrap(),
                Value::Bool(false)
            );
        }
    }

    #[test]
    fn equality_never_fails_across_types() {
        assert_eq!(bin(BinaryOp::Eq, Value::from("a"), Value::Int(1)).unwrap(), Value::Bool(false));
        assert_eq!(bin(BinaryOp::Neq, Value::Null, Value::Int(1)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn membership_in_list_and_map() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(bin(BinaryOp::In, Value::Int(2), list).unwrap(), Value::Bool(true));

        let mut map = MapValue::new();
        map.insert(Value::from("a"), Value::Int(1));
        assert_eq!(bin(BinaryOp::In, Value::from("a"), Value::Map(map.clone())).unwrap(), Value::Bool(true));
        assert_eq!(bin(BinaryOp::In, Value::from("b"), Value::Map(map)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn membership_requires_list_or_map() {
        let err = bin(BinaryOp::In, Value::Int(1), Value::from("abc")).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn negation_parity() {
        assert_eq!(negate(Value::Int(5), 1).unwrap(), Value::Int(-5));
        assert_eq!(negate(Value::Int(5), 2).unwrap(), Value::Int(5));
        assert_eq!(negate(Value::Double(2.5), 3).unwrap(), Value::Double(-2.5));
        assert!(negate(Value::from("x"), 2).is_err());
        assert_eq!(
            negate(Value::Int(i64::MIN), 1).unwrap_err(),
            EvalError::Overflow { op: "-" }
        );
    }

    #[test]
    fn logical_not_parity_and_null() {
        assert_eq!(logical_not(Value::Bool(true), 1).unwrap(), Value::Bool(false));
        assert_eq!(logical_not(Value::Bool(true), 2).unwrap(), Value::Bool(true));
        assert_eq!(logical_not(Value::Null, 1).unwrap(), Value::Bool(true));
        assert_eq!(logical_not(Value::Null, 2).unwrap(), Value::Bool(false));
        assert!(logical_not(Value::Int(1), 1).is_err());
    }

    #[test]
    fn uint_negation_is_a_type_error() {
        let err = negate(Value::Uint(5), 1).unwrap_err();
        assert_eq!(err, EvalError::UnsupportedUnary { op: "-", operand: "uint" });
    }
}
