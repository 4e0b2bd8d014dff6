use std::fmt;

use thiserror::Error;

use crate::token::Span;

/// A single lex or syntax error, anchored to a source span.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedChar {
        found: char,
    },
    UnterminatedString,
    UnterminatedComment,
    InvalidEscape {
        sequence: String,
    },
    /// A `\u`/`\U` escape in a bytes literal that does not fit one byte.
    EscapeNotAByte {
        code_point: u32,
    },
    InvalidCodePoint {
        value: u32,
    },
    NumberOutOfRange {
        literal: String,
    },
    LeadingZero,
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    UnexpectedEof {
        expected: &'static str,
    },
    TrailingInput {
        found: String,
    },
    NestingTooDeep,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedChar { found } => {
                write!(f, "unexpected character {found:?}")
            }
            ParseErrorKind::UnterminatedString => write!(f, "unterminated string literal"),
            ParseErrorKind::UnterminatedComment => write!(f, "unterminated comment"),
            ParseErrorKind::InvalidEscape { sequence } => {
                write!(f, "invalid escape sequence '\\{sequence}'")
            }
            ParseErrorKind::EscapeNotAByte { code_point } => {
                write!(
                    f,
                    "unicode escape U+{code_point:04X} does not fit a single byte in a bytes literal"
                )
            }
            ParseErrorKind::InvalidCodePoint { value } => {
                write!(f, "invalid unicode code point U+{value:04X}")
            }
            ParseErrorKind::NumberOutOfRange { literal } => {
                write!(f, "numeric literal '{literal}' out of range")
            }
            ParseErrorKind::LeadingZero => {
                write!(f, "integer literals may not have leading zeros")
            }
            ParseErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            ParseErrorKind::UnexpectedEof { expected } => {
                write!(f, "expected {expected}, found end of input")
            }
            ParseErrorKind::TrailingInput { found } => {
                write!(f, "unexpected {found} after expression")
            }
            ParseErrorKind::NestingTooDeep => write!(f, "expression nesting too deep"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.span.start)
    }
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        ParseError { kind, span }
    }

    /// Renders the error with the offending source line and a caret
    /// underline, for CLI-style output.
    pub fn display_with_source(&self, source: &str) -> String {
        let (line_num, line_start, line_content) = self.find_context(source);
        let col = self.span.start.saturating_sub(line_start);
        let len = (self.span.end - self.span.start).max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));

        format!(
            "error: {}\n{:4} | {}\n     | {}",
            self.kind, line_num, line_content, underline
        )
    }

    fn find_context<'s>(&self, source: &'s str) -> (usize, usize, &'s str) {
        let mut line_num = 1;
        let mut line_start = 0;

        for (i, c) in source.char_indices() {
            if i >= self.span.start {
                break;
            }
            if c == '\n' {
                line_num += 1;
                line_start = i + 1;
            }
        }

        let line_end = source[line_start..]
            .find('\n')
            .map(|off| line_start + off)
            .unwrap_or(source.len());

        (line_num, line_start, &source[line_start..line_end])
    }
}

/// All errors accumulated over one parse attempt, in source order.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ParseErrors {
    pub errors: Vec<ParseError>,
}

impl ParseErrors {
    pub fn new(errors: Vec<ParseError>) -> Self {
        debug_assert!(!errors.is_empty());
        ParseErrors { errors }
    }

    /// One rendered message per error, the `Failure { errors }` surface.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Runtime failure raised while walking the tree.
///
/// Covers both the type-error and evaluation-error rows of the taxonomy;
/// [`EvalError::is_type_error`] tells them apart and [`CelError`] surfaces
/// the distinction to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    // Type errors: an operation applied to an unsupported combination.
    #[error("cannot apply '{op}' to {left} and {right}")]
    UnsupportedBinary {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("cannot apply unary '{op}' to {operand}")]
    UnsupportedUnary {
        op: &'static str,
        operand: &'static str,
    },
    #[error("cannot compare {left} with {right}")]
    NotComparable {
        left: &'static str,
        right: &'static str,
    },
    #[error("expected bool in {context}, found {got}")]
    BoolExpected {
        context: &'static str,
        got: &'static str,
    },
    #[error("{function}() expects {expected}, got {got}")]
    ArgumentType {
        function: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("cannot select field '{field}' on {object}")]
    FieldSelection {
        field: String,
        object: &'static str,
    },
    #[error("cannot index {object} with {index}")]
    IndexAccess {
        object: &'static str,
        index: &'static str,
    },

    // Evaluation errors.
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("integer overflow in '{op}'")]
    Overflow { op: &'static str },
    #[error("index {index} out of bounds, list has {len} elements")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("no such key: {key}")]
    NoSuchKey { key: String },
    #[error("no such field: {field}")]
    NoSuchField { field: String },
    #[error("Identifier \"{name}\" not found in context: {context}")]
    UnknownIdentifier { name: String, context: String },
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
    #[error("{function}() takes exactly {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid timestamp: {input}")]
    InvalidTimestamp { input: String },
    #[error("invalid duration: {input}")]
    InvalidDuration { input: String },
    #[error("{macro_name}() iteration variable must be a simple identifier")]
    MacroVarNotIdentifier { macro_name: &'static str },
    #[error("has() requires a field selection or index expression")]
    HasArgument,
    #[error("'{name}' is a reserved identifier")]
    ReservedIdentifier { name: String },
    #[error("expression recursion limit of {limit} exceeded")]
    RecursionLimit { limit: usize },
    #[error("bytes are not valid UTF-8")]
    InvalidUtf8,
    #[error("{function}() value out of range: {value}")]
    NumericRange { function: &'static str, value: String },
    #[error("{0}")]
    Message(String),
}

impl EvalError {
    /// True for the static-type-shaped failures (operator or builtin
    /// applied to an unsupported type combination).
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            EvalError::UnsupportedBinary { .. }
                | EvalError::UnsupportedUnary { .. }
                | EvalError::NotComparable { .. }
                | EvalError::BoolExpected { .. }
                | EvalError::ArgumentType { .. }
                | EvalError::FieldSelection { .. }
                | EvalError::IndexAccess { .. }
        )
    }
}

/// Top-level error taxonomy of the public API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CelError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseErrors),
    #[error("type error: {0}")]
    Type(EvalError),
    #[error("evaluation error: {0}")]
    Eval(EvalError),
}

impl From<EvalError> for CelError {
    fn from(err: EvalError) -> Self {
        if err.is_type_error() {
            CelError::Type(err)
        } else {
            CelError::Eval(err)
        }
    }
}
