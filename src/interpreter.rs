//! Tree-walking evaluator.
//!
//! Walks the CST, resolving names against the caller's [`Context`],
//! short-circuiting `&&`/`||`/`?:` so the pruned side is never evaluated,
//! and dispatching everything else to the operator kernel, the built-in
//! library, the macro engine, and user functions. Evaluation is
//! stateless across calls: the same tree can be walked any number of
//! times, concurrently, against different contexts.

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::builtins;
use crate::context::Context;
use crate::error::EvalError;
use crate::macros;
use crate::ops;
use crate::value::Value;

/// Identifiers reserved by the language. They may appear as field names
/// in a dotted chain but never as standalone expressions.
const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let",
    "loop", "package", "namespace", "return", "var", "void", "while",
];

/// One frame of macro scope: an iteration variable bound over a parent
/// chain. Frames live on the interpreter's call stack; extending the
/// environment is pushing a frame, restoring it is returning.
pub(crate) struct Frame<'s> {
    name: &'s str,
    value: Value,
    parent: Option<&'s Frame<'s>>,
}

impl<'s> Frame<'s> {
    pub(crate) fn new(name: &'s str, value: Value, parent: Option<&'s Frame<'s>>) -> Self {
        Frame { name, value, parent }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        if self.name == name {
            Some(&self.value)
        } else {
            self.parent.and_then(|p| p.lookup(name))
        }
    }
}

pub struct Interpreter<'c> {
    context: &'c Context,
    depth: usize,
}

impl<'c> Interpreter<'c> {
    pub fn new(context: &'c Context) -> Self {
        Interpreter { context, depth: 0 }
    }

    /// Evaluates `expr` to a single value or the first error reached.
    pub fn run(&mut self, expr: &Expr<'_>) -> Result<Value, EvalError> {
        self.eval(expr, None)
    }

    pub(crate) fn eval(
        &mut self,
        expr: &Expr<'_>,
        scope: Option<&Frame<'_>>,
    ) -> Result<Value, EvalError> {
        self.depth += 1;
        if self.depth > self.context.max_depth() {
            self.depth -= 1;
            return Err(EvalError::RecursionLimit { limit: self.context.max_depth() });
        }
        let result = self.eval_inner(expr, scope);
        self.depth -= 1;
        result
    }

    fn eval_inner(
        &mut self,
        expr: &Expr<'_>,
        scope: Option<&Frame<'_>>,
    ) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal_value(lit)),

            ExprKind::Ident(name) => self.resolve_ident(name, scope),

            ExprKind::List(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in *elements {
                    items.push(self.eval(element, scope)?);
                }
                Ok(Value::List(items))
            }

            ExprKind::Map(entries) => {
                let mut map = crate::value::MapValue::new();
                for (key_expr, value_expr) in *entries {
                    let key = self.eval(key_expr, scope)?;
                    let value = self.eval(value_expr, scope)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }

            ExprKind::Unary { op, count, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => ops::logical_not(value, *count),
                    UnaryOp::Neg => ops::negate(value, *count),
                }
            }

            ExprKind::Binary { op: BinaryOp::And, left, right } => {
                match self.eval(left, scope)? {
                    Value::Bool(false) => Ok(Value::Bool(false)),
                    Value::Bool(true) => self.expect_bool(right, scope, "'&&'"),
                    other => Err(EvalError::BoolExpected {
                        context: "'&&'",
                        got: other.type_of(),
                    }),
                }
            }

            ExprKind::Binary { op: BinaryOp::Or, left, right } => {
                match self.eval(left, scope)? {
                    Value::Bool(true) => Ok(Value::Bool(true)),
                    Value::Bool(false) => self.expect_bool(right, scope, "'||'"),
                    other => Err(EvalError::BoolExpected {
                        context: "'||'",
                        got: other.type_of(),
                    }),
                }
            }

            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                ops::apply_binary(*op, left, right)
            }

            ExprKind::Ternary { cond, then, otherwise } => {
                match self.eval(cond, scope)? {
                    Value::Bool(true) => self.eval(then, scope),
                    Value::Bool(false) => self.eval(otherwise, scope),
                    other => Err(EvalError::BoolExpected {
                        context: "'?:' condition",
                        got: other.type_of(),
                    }),
                }
            }

            ExprKind::Member { object, field } => {
                let object = self.eval(object, scope)?;
                self.select_field(object, field)
            }

            ExprKind::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                self.select_index(object, index)
            }

            ExprKind::Call { name, args } => self.call_function(name, args, scope),

            ExprKind::Method { object, name, args } => {
                self.call_method(object, name, args, scope)
            }
        }
    }

    fn expect_bool(
        &mut self,
        expr: &Expr<'_>,
        scope: Option<&Frame<'_>>,
        context: &'static str,
    ) -> Result<Value, EvalError> {
        match self.eval(expr, scope)? {
            value @ Value::Bool(_) => Ok(value),
            other => Err(EvalError::BoolExpected { context, got: other.type_of() }),
        }
    }

    fn resolve_ident(
        &mut self,
        name: &str,
        scope: Option<&Frame<'_>>,
    ) -> Result<Value, EvalError> {
        if RESERVED.contains(&name) {
            return Err(EvalError::ReservedIdentifier { name: name.to_string() });
        }
        if let Some(value) = scope.and_then(|frame| frame.lookup(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.context.get(name) {
            return Ok(value.clone());
        }
        Err(EvalError::UnknownIdentifier {
            name: name.to_string(),
            context: self.context.describe_bindings(),
        })
    }

    pub(crate) fn select_field(&self, object: Value, field: &str) -> Result<Value, EvalError> {
        match object {
            Value::Map(map) => map
                .get(&Value::String(field.to_string()))
                .cloned()
                .ok_or_else(|| EvalError::NoSuchField { field: field.to_string() }),
            other => Err(EvalError::FieldSelection {
                field: field.to_string(),
                object: other.type_of(),
            }),
        }
    }

    fn select_index(&self, object: Value, index: Value) -> Result<Value, EvalError> {
        match object {
            Value::List(items) => {
                let len = items.len();
                match list_index(&index, len)? {
                    Some(i) => Ok(items[i].clone()),
                    None => Err(EvalError::IndexOutOfBounds {
                        index: index_as_i64(&index),
                        len,
                    }),
                }
            }
            Value::Map(map) => map
                .get(&index)
                .cloned()
                .ok_or_else(|| EvalError::NoSuchKey { key: index.to_display_string() }),
            other => Err(EvalError::IndexAccess {
                object: other.type_of(),
                index: index.type_of(),
            }),
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        args: &[&Expr<'_>],
        scope: Option<&Frame<'_>>,
    ) -> Result<Value, EvalError> {
        // has() is syntax, not a function: it needs the unevaluated path.
        if name == "has" {
            if args.len() != 1 {
                return Err(EvalError::Arity {
                    function: "has".into(),
                    expected: 1,
                    got: args.len(),
                });
            }
            if !args[0].is_selection() {
                return Err(EvalError::HasArgument);
            }
            return macros::eval_has(self, scope, args[0]);
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }

        // user functions shadow built-ins of the same name
        if let Some(function) = self.context.function(name) {
            return function(&values);
        }
        match builtins::call(name, values)? {
            Some(value) => Ok(value),
            None => Err(EvalError::UnknownFunction { name: name.to_string() }),
        }
    }

    fn call_method(
        &mut self,
        object: &Expr<'_>,
        name: &str,
        args: &[&Expr<'_>],
        scope: Option<&Frame<'_>>,
    ) -> Result<Value, EvalError> {
        if macros::is_macro(name) {
            return macros::eval_macro(self, scope, name, object, args);
        }

        let receiver = self.eval(object, scope)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }

        match builtins::call_method(name, receiver.clone(), values.clone())? {
            Some(value) => Ok(value),
            None => {
                // receiver-style call of a user function: x.f(a) == f(x, a)
                if let Some(function) = self.context.function(name) {
                    let mut with_receiver = Vec::with_capacity(values.len() + 1);
                    with_receiver.push(receiver);
                    with_receiver.extend(values);
                    return function(&with_receiver);
                }
                Err(EvalError::UnknownFunction { name: name.to_string() })
            }
        }
    }
}

fn literal_value(lit: &Literal<'_>) -> Value {
    match lit {
        Literal::Int(n) => Value::Int(*n),
        Literal::Uint(n) => Value::Uint(*n),
        Literal::Double(d) => Value::Double(*d),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::String(s) => Value::String(s.to_string()),
        Literal::Bytes(b) => Value::Bytes(b.to_vec()),
        Literal::Null => Value::Null,
    }
}

/// Converts an index value to a list position. `Ok(None)` is a
/// well-typed index that is out of bounds, so `has(x[9])` can answer
/// false where plain indexing reports the bounds error.
pub(crate) fn list_index(index: &Value, len: usize) -> Result<Option<usize>, EvalError> {
    let i = match index {
        Value::Int(n) => *n,
        Value::Uint(n) => {
            if *n > i64::MAX as u64 {
                return Ok(None);
            }
            *n as i64
        }
        other => {
            return Err(EvalError::IndexAccess { object: "list", index: other.type_of() })
        }
    };
    if i < 0 || i as usize >= len {
        return Ok(None);
    }
    Ok(Some(i as usize))
}

fn index_as_i64(index: &Value) -> i64 {
    match index {
        Value::Int(n) => *n,
        Value::Uint(n) => i64::try_from(*n).unwrap_or(i64::MAX),
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::parser::parse;
    use crate::value::MapValue;

    fn eval_with(source: &str, context: &Context) -> Result<Value, EvalError> {
        let arena = Arena::new();
        let expr = parse(&arena, source).expect("parse");
        Interpreter::new(context).run(expr)
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        eval_with(source, &Context::new())
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        assert_eq!(eval("42").unwrap(), Value::Int(42));
        assert_eq!(eval("\"hi\"").unwrap(), Value::from("hi"));
        assert_eq!(eval("null").unwrap(), Value::Null);
        assert_eq!(eval("true").unwrap(), Value::Bool(true));
    }

    #[test]
    fn identifier_resolution_uses_bindings() {
        let mut ctx = Context::new();
        ctx.insert("a", Value::Int(41));
        assert_eq!(eval_with("a + 1", &ctx).unwrap(), Value::Int(42));
    }

    #[test]
    fn unknown_identifier_names_the_context() {
        let mut ctx = Context::new();
        ctx.insert("user", Value::Int(1));
        let err = eval_with("missing", &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Identifier \"missing\" not found in context: {user}"
        );
    }

    #[test]
    fn unknown_identifier_without_context() {
        let err = eval("x").unwrap_err();
        assert!(err.to_string().contains("no context passed"));
    }

    #[test]
    fn reserved_identifiers_are_rejected_standalone() {
        let err = eval("return").unwrap_err();
        assert_eq!(err, EvalError::ReservedIdentifier { name: "return".into() });
    }

    #[test]
    fn reserved_identifiers_allowed_as_field_names() {
        let mut inner = MapValue::new();
        inner.insert(Value::from("return"), Value::Int(7));
        let mut ctx = Context::new();
        ctx.insert("msg", Value::Map(inner));
        assert_eq!(eval_with("msg.return", &ctx).unwrap(), Value::Int(7));
    }

    #[test]
    fn field_chain_resolution() {
        let mut role = MapValue::new();
        role.insert(Value::from("role"), Value::from("admin"));
        let mut ctx = Context::new();
        ctx.insert("user", Value::Map(role));
        assert_eq!(eval_with("user.role", &ctx).unwrap(), Value::from("admin"));
        let err = eval_with("user.nope", &ctx).unwrap_err();
        assert_eq!(err, EvalError::NoSuchField { field: "nope".into() });
    }

    #[test]
    fn field_selection_on_non_map_is_a_type_error() {
        let mut ctx = Context::new();
        ctx.insert("n", Value::Int(1));
        let err = eval_with("n.field", &ctx).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn list_indexing_and_bounds() {
        assert_eq!(eval("[10, 20, 30][1]").unwrap(), Value::Int(20));
        assert_eq!(eval("[10, 20, 30][0u]").unwrap(), Value::Int(10));
        assert_eq!(
            eval("[10][5]").unwrap_err(),
            EvalError::IndexOutOfBounds { index: 5, len: 1 }
        );
        assert_eq!(
            eval("[10][-1]").unwrap_err(),
            EvalError::IndexOutOfBounds { index: -1, len: 1 }
        );
    }

    #[test]
    fn map_indexing() {
        assert_eq!(eval("{\"a\": 1, \"b\": 2}[\"b\"]").unwrap(), Value::Int(2));
        assert_eq!(
            eval("{\"a\": 1}[\"z\"]").unwrap_err(),
            EvalError::NoSuchKey { key: "z".into() }
        );
        assert_eq!(eval("{1: \"one\"}[1u]").unwrap(), Value::from("one"));
    }

    #[test]
    fn indexing_non_collection_is_a_type_error() {
        assert!(eval("5[0]").unwrap_err().is_type_error());
        assert!(eval("[1][\"a\"]").unwrap_err().is_type_error());
    }

    #[test]
    fn short_circuit_and_masks_errors() {
        assert_eq!(eval("false && (1 / 0 > 0)").unwrap(), Value::Bool(false));
        assert_eq!(eval("true || (1 / 0 > 0)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn non_short_circuit_side_still_fails() {
        assert_eq!(eval("true && (1 / 0 > 0)").unwrap_err(), EvalError::DivisionByZero);
        assert_eq!(eval("false || (1 / 0 > 0)").unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn logical_operands_must_be_bool() {
        assert!(matches!(
            eval("1 && true").unwrap_err(),
            EvalError::BoolExpected { context: "'&&'", .. }
        ));
        assert!(matches!(
            eval("true && 1").unwrap_err(),
            EvalError::BoolExpected { context: "'&&'", .. }
        ));
    }

    #[test]
    fn ternary_evaluates_only_the_selected_branch() {
        assert_eq!(eval("true ? 1 : (1 / 0)").unwrap(), Value::Int(1));
        assert_eq!(eval("false ? (1 / 0) : 2").unwrap(), Value::Int(2));
        assert!(matches!(
            eval("5 ? 1 : 2").unwrap_err(),
            EvalError::BoolExpected { .. }
        ));
    }

    #[test]
    fn builtin_calls_dispatch() {
        assert_eq!(eval("size(\"abc\")").unwrap(), Value::Int(3));
        assert_eq!(eval("type(1u)").unwrap(), Value::from("uint"));
        assert_eq!(eval("min(3, 2)").unwrap(), Value::Int(2));
    }

    #[test]
    fn unknown_function_is_an_error() {
        assert_eq!(
            eval("nope(1)").unwrap_err(),
            EvalError::UnknownFunction { name: "nope".into() }
        );
    }

    #[test]
    fn user_functions_override_builtins() {
        let mut ctx = Context::new();
        ctx.add_function("size", |_args| Ok(Value::Int(-1)));
        assert_eq!(eval_with("size(\"abc\")", &ctx).unwrap(), Value::Int(-1));
    }

    #[test]
    fn user_function_receiver_style_fall_through() {
        let mut ctx = Context::new();
        ctx.add_function("between", |args| match args {
            [Value::Int(x), Value::Int(lo), Value::Int(hi)] => {
                Ok(Value::Bool(lo <= x && x <= hi))
            }
            _ => Err(EvalError::Message("between() wants three ints".into())),
        });
        assert_eq!(eval_with("5.between(1, 10)", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(eval_with("between(15, 1, 10)", &ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn context_identifiers_are_not_callable() {
        let mut ctx = Context::new();
        ctx.insert("f", Value::Int(1));
        assert_eq!(
            eval_with("f(2)", &ctx).unwrap_err(),
            EvalError::UnknownFunction { name: "f".into() }
        );
    }

    #[test]
    fn recursion_guard_trips_on_deep_trees() {
        let ctx = Context::new().with_max_depth(16);
        let deep = format!("{}1{}", "[".repeat(40), "]".repeat(40));
        let err = eval_with(&deep, &ctx).unwrap_err();
        assert_eq!(err, EvalError::RecursionLimit { limit: 16 });
    }

    #[test]
    fn string_method_dispatch() {
        assert_eq!(eval("\"hello\".startsWith(\"he\")").unwrap(), Value::Bool(true));
        assert_eq!(eval("\" x \".trim()").unwrap(), Value::from("x"));
    }

    #[test]
    fn timestamp_accessor_dispatch() {
        assert_eq!(
            eval("timestamp(\"2023-07-04T09:30:00Z\").getFullYear()").unwrap(),
            Value::Int(2023)
        );
    }
}
