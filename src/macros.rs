//! Collection macros and `has()`.
//!
//! A macro looks like a receiver-style call but its predicate/transform
//! argument is an unevaluated tree, evaluated once per element with the
//! iteration variable bound in a child scope frame. Nested macros shadow
//! an outer variable of the same name; the outer binding is restored
//! when the frame is dropped on return.
//!
//! Map iteration binds the entry *value*, in insertion order. `filter`
//! over a map keeps the passing entries as a map; `map` over a map
//! produces a list of transformed values.

use crate::ast::Expr;
use crate::error::EvalError;
use crate::interpreter::{list_index, Frame, Interpreter};
use crate::value::{MapValue, Value};

pub(crate) fn is_macro(name: &str) -> bool {
    matches!(name, "all" | "exists" | "exists_one" | "filter" | "map")
}

pub(crate) fn eval_macro(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    name: &str,
    receiver: &Expr<'_>,
    args: &[&Expr<'_>],
) -> Result<Value, EvalError> {
    let expected = if name == "map" && args.len() == 3 { 3 } else { 2 };
    if args.len() != expected {
        return Err(EvalError::Arity {
            function: name.to_string(),
            expected,
            got: args.len(),
        });
    }

    let var = args[0].as_ident().ok_or(match name {
        "all" => EvalError::MacroVarNotIdentifier { macro_name: "all" },
        "exists" => EvalError::MacroVarNotIdentifier { macro_name: "exists" },
        "exists_one" => EvalError::MacroVarNotIdentifier { macro_name: "exists_one" },
        "filter" => EvalError::MacroVarNotIdentifier { macro_name: "filter" },
        _ => EvalError::MacroVarNotIdentifier { macro_name: "map" },
    })?;

    let collection = interp.eval(receiver, scope)?;

    match name {
        "all" => all(interp, scope, var, collection, args[1]),
        "exists" => exists(interp, scope, var, collection, args[1]),
        "exists_one" => exists_one(interp, scope, var, collection, args[1]),
        "filter" => filter(interp, scope, var, collection, args[1]),
        "map" if args.len() == 2 => map_transform(interp, scope, var, collection, None, args[1]),
        _ => map_transform(interp, scope, var, collection, Some(args[1]), args[2]),
    }
}

/// The elements a macro iterates: list elements, or map entry values in
/// insertion order.
fn iterable(name: &str, collection: Value) -> Result<Vec<Value>, EvalError> {
    match collection {
        Value::List(items) => Ok(items),
        Value::Map(map) => Ok(map.values().cloned().collect()),
        other => Err(EvalError::ArgumentType {
            function: name.to_string(),
            expected: "a list or map",
            got: other.type_of(),
        }),
    }
}

fn predicate_bool(name: &str, value: Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::ArgumentType {
            function: name.to_string(),
            expected: "a bool predicate",
            got: other.type_of(),
        }),
    }
}

fn all(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    var: &str,
    collection: Value,
    predicate: &Expr<'_>,
) -> Result<Value, EvalError> {
    // vacuously true on empty; stops at the first false
    for item in iterable("all", collection)? {
        let frame = Frame::new(var, item, scope);
        let holds = predicate_bool("all", interp.eval(predicate, Some(&frame))?)?;
        if !holds {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn exists(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    var: &str,
    collection: Value,
    predicate: &Expr<'_>,
) -> Result<Value, EvalError> {
    for item in iterable("exists", collection)? {
        let frame = Frame::new(var, item, scope);
        if predicate_bool("exists", interp.eval(predicate, Some(&frame))?)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn exists_one(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    var: &str,
    collection: Value,
    predicate: &Expr<'_>,
) -> Result<Value, EvalError> {
    let mut matches = 0u32;
    for item in iterable("exists_one", collection)? {
        let frame = Frame::new(var, item, scope);
        if predicate_bool("exists_one", interp.eval(predicate, Some(&frame))?)? {
            matches += 1;
            if matches > 1 {
                return Ok(Value::Bool(false));
            }
        }
    }
    Ok(Value::Bool(matches == 1))
}

fn filter(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    var: &str,
    collection: Value,
    predicate: &Expr<'_>,
) -> Result<Value, EvalError> {
    match collection {
        Value::List(items) => {
            let mut kept = Vec::new();
            for item in items {
                let frame = Frame::new(var, item.clone(), scope);
                if predicate_bool("filter", interp.eval(predicate, Some(&frame))?)? {
                    kept.push(item);
                }
            }
            Ok(Value::List(kept))
        }
        Value::Map(map) => {
            // the sub-map whose entry values pass the predicate
            let mut kept = MapValue::new();
            for (key, value) in map.iter() {
                let frame = Frame::new(var, value.clone(), scope);
                if predicate_bool("filter", interp.eval(predicate, Some(&frame))?)? {
                    kept.insert(key.clone(), value.clone());
                }
            }
            Ok(Value::Map(kept))
        }
        other => Err(EvalError::ArgumentType {
            function: "filter".to_string(),
            expected: "a list or map",
            got: other.type_of(),
        }),
    }
}

fn map_transform(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    var: &str,
    collection: Value,
    predicate: Option<&Expr<'_>>,
    transform: &Expr<'_>,
) -> Result<Value, EvalError> {
    let mut out = Vec::new();
    for item in iterable("map", collection)? {
        let frame = Frame::new(var, item, scope);
        if let Some(predicate) = predicate {
            if !predicate_bool("map", interp.eval(predicate, Some(&frame))?)? {
                continue;
            }
        }
        out.push(interp.eval(transform, Some(&frame))?);
    }
    Ok(Value::List(out))
}

/// `has(e)`: resolves the selection path with tolerance for missing
/// links. The root of the path evaluates normally (an unknown root
/// identifier is still an error); each subsequent field or index link
/// that is absent makes the whole test false instead of failing.
pub(crate) fn eval_has(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    expr: &Expr<'_>,
) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(
        resolve_presence(interp, scope, expr)?,
        Presence::Present(_)
    )))
}

enum Presence {
    Present(Value),
    Missing,
}

fn resolve_presence(
    interp: &mut Interpreter<'_>,
    scope: Option<&Frame<'_>>,
    expr: &Expr<'_>,
) -> Result<Presence, EvalError> {
    use crate::ast::ExprKind;

    match &expr.kind {
        ExprKind::Member { object, field } => {
            match resolve_presence(interp, scope, object)? {
                Presence::Missing => Ok(Presence::Missing),
                Presence::Present(Value::Map(map)) => {
                    Ok(match map.get(&Value::String(field.to_string())) {
                        Some(value) => Presence::Present(value.clone()),
                        None => Presence::Missing,
                    })
                }
                // a link of the wrong shape cannot resolve: also false
                Presence::Present(_) => Ok(Presence::Missing),
            }
        }
        ExprKind::Index { object, index } => {
            match resolve_presence(interp, scope, object)? {
                Presence::Missing => Ok(Presence::Missing),
                Presence::Present(Value::List(items)) => {
                    let index = interp.eval(index, scope)?;
                    Ok(match list_index(&index, items.len())? {
                        Some(i) => Presence::Present(items[i].clone()),
                        None => Presence::Missing,
                    })
                }
                Presence::Present(Value::Map(map)) => {
                    let key = interp.eval(index, scope)?;
                    Ok(match map.get(&key) {
                        Some(value) => Presence::Present(value.clone()),
                        None => Presence::Missing,
                    })
                }
                Presence::Present(_) => Ok(Presence::Missing),
            }
        }
        _ => interp.eval(expr, scope).map(Presence::Present),
    }
}
