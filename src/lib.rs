//! Embeddable evaluator for Google's Common Expression Language (CEL).
//!
//! A caller supplies an expression as source text, an optional binding
//! environment, and an optional table of user functions; evaluation
//! returns a single [`Value`] or a typed error. Expressions are
//! side-effect free: no I/O, no mutation of the caller's bindings, and
//! resource use bounded by the expression and its inputs.
//!
//! Parsing and evaluation are separate so a tree can be parsed once and
//! evaluated many times:
//!
//! ```
//! use celeval::{Arena, Context, Value};
//!
//! let arena = Arena::new();
//! let expr = celeval::parse(&arena, "a + 2 * 2").unwrap();
//!
//! let mut ctx = Context::new();
//! ctx.insert("a", Value::Int(2));
//! assert_eq!(celeval::evaluate(expr, &ctx).unwrap(), Value::Int(6));
//!
//! ctx.insert("a", Value::Int(10));
//! assert_eq!(celeval::evaluate(expr, &ctx).unwrap(), Value::Int(14));
//! ```
//!
//! Or in one step from source:
//!
//! ```
//! use celeval::{Context, Value};
//!
//! let result = celeval::eval("[1, 2, 3, 4].filter(v, v > 2)", &Context::new()).unwrap();
//! assert_eq!(result, Value::List(vec![Value::Int(3), Value::Int(4)]));
//! ```

pub mod arena;
pub mod ast;
mod builtins;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod json;
pub mod lexer;
mod macros;
mod ops;
pub mod parser;
pub mod time;
pub mod token;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use arena::Arena;
pub use context::Context;
pub use error::{CelError, EvalError, ParseError, ParseErrorKind, ParseErrors};
pub use interpreter::Interpreter;
pub use parser::parse;
pub use value::{MapValue, Value};

use tracing::debug;

/// Evaluates an already-parsed expression against `context`.
///
/// The tree is immutable and may be shared: the same CST can be walked
/// concurrently from many threads, each with its own context.
pub fn evaluate(expr: &ast::Expr<'_>, context: &Context) -> Result<Value, CelError> {
    let mut interp = Interpreter::new(context);
    interp.run(expr).map_err(CelError::from)
}

/// Parses and evaluates `source` in one call.
pub fn eval(source: &str, context: &Context) -> Result<Value, CelError> {
    debug!(source_len = source.len(), "evaluating expression from source");
    let arena = Arena::new();
    let expr = parse(&arena, source)?;
    evaluate(expr, context)
}
