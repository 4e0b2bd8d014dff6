//! Recursive-descent parser for the CEL expression grammar.
//!
//! One method per precedence level, lowest first:
//!
//! ```text
//! expr           = or ('?' expr ':' expr)?          right-associative
//! or             = and ('||' and)*
//! and            = relation ('&&' relation)*
//! relation       = addition (relop addition)?       non-associative
//! addition       = multiplication (('+'|'-') multiplication)*
//! multiplication = unary (('*'|'/'|'%') unary)*
//! unary          = ('!' | '-')* postfix
//! postfix        = atom ('.' ident call? | '[' expr ']')*
//! ```
//!
//! Errors are accumulated, not thrown: element-level failures inside
//! lists, maps, and argument lists record the error, synchronize on the
//! next comma or closing delimiter, and keep going so one parse reports
//! everything it can find.

#[cfg(test)]
mod tests;

use crate::arena::Arena;
use crate::ast::{AstBuilder, BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::error::{ParseError, ParseErrorKind, ParseErrors};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

pub(crate) type ParseResult<T> = Result<T, ParseError>;

/// Nesting levels before the parser refuses adversarial input.
const MAX_PARSE_DEPTH: usize = 200;

/// Parses `source` into a CST allocated in `arena`.
///
/// Pure and deterministic. On failure every lex and syntax error found in
/// the attempt is returned, in source order.
pub fn parse<'a>(arena: &'a Arena, source: &str) -> Result<&'a Expr<'a>, ParseErrors> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    tracing::trace!(tokens = tokens.len(), lex_errors = lex_errors.len(), "lexed expression");
    let end = source.len();
    let mut parser = Parser::new(tokens, AstBuilder::new(arena), end);

    let root = parser.parse_root();
    let mut errors = lex_errors;
    errors.extend(parser.errors);

    match root {
        Ok(expr) if errors.is_empty() => Ok(expr),
        Ok(_) => Err(ParseErrors::new(errors)),
        Err(err) => {
            errors.push(err);
            Err(ParseErrors::new(errors))
        }
    }
}

pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    builder: AstBuilder<'a>,
    depth: usize,
    /// End offset of the source, for EOF spans.
    end: usize,
    pub(crate) errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, builder: AstBuilder<'a>, end: usize) -> Self {
        Parser { tokens, current: 0, builder, depth: 0, end, errors: Vec::new() }
    }

    fn parse_root(&mut self) -> ParseResult<&'a Expr<'a>> {
        if self.is_at_end() {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedEof { expected: "an expression" },
                Span::new(self.end, self.end),
            ));
        }
        let expr = self.expr()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::new(
                ParseErrorKind::TrailingInput { found: token.kind.describe().to_string() },
                token.span,
            ));
        }
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Precedence levels
    // ------------------------------------------------------------------

    fn expr(&mut self) -> ParseResult<&'a Expr<'a>> {
        self.enter()?;
        let result = self.ternary();
        self.depth -= 1;
        result
    }

    fn ternary(&mut self) -> ParseResult<&'a Expr<'a>> {
        let cond = self.or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expr()?;
        self.expect(&TokenKind::Colon, "':' in conditional")?;
        // Parsing the else branch at full expression level makes `?:`
        // right-associative.
        let otherwise = self.expr()?;
        Ok(self.builder.ternary(cond, then, otherwise))
    }

    fn or(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and()?;
            left = self.builder.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut left = self.relation()?;
        while self.eat(&TokenKind::And) {
            let right = self.relation()?;
            left = self.builder.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn relation(&mut self) -> ParseResult<&'a Expr<'a>> {
        let left = self.addition()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => BinaryOp::Eq,
            Some(TokenKind::Neq) => BinaryOp::Neq,
            Some(TokenKind::Lt) => BinaryOp::Lt,
            Some(TokenKind::Lte) => BinaryOp::Lte,
            Some(TokenKind::Gt) => BinaryOp::Gt,
            Some(TokenKind::Gte) => BinaryOp::Gte,
            Some(TokenKind::In) => BinaryOp::In,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.addition()?;
        Ok(self.builder.binary(op, left, right))
    }

    fn addition(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut left = self.multiplication()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplication()?;
            left = self.builder.binary(op, left, right);
        }
        Ok(left)
    }

    fn multiplication(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = self.builder.binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<&'a Expr<'a>> {
        self.enter()?;
        let result = self.unary_inner();
        self.depth -= 1;
        result
    }

    fn unary_inner(&mut self) -> ParseResult<&'a Expr<'a>> {
        match self.peek_kind() {
            Some(TokenKind::Bang) => {
                let start = self.peek().unwrap().span.start;
                let mut count = 0u32;
                while self.eat(&TokenKind::Bang) {
                    count += 1;
                }
                let operand = self.unary()?;
                Ok(self.builder.unary(UnaryOp::Not, count, operand, start))
            }
            Some(TokenKind::Minus) => {
                let start = self.peek().unwrap().span.start;
                let mut count = 0u32;
                while self.eat(&TokenKind::Minus) {
                    count += 1;
                }
                // One minus folds into a directly following numeric
                // literal, so i64::MIN is representable in source.
                if let Some(lit) = self.try_negative_literal()? {
                    count -= 1;
                    if count == 0 {
                        return Ok(lit);
                    }
                    return Ok(self.builder.unary(UnaryOp::Neg, count, lit, start));
                }
                let operand = self.unary()?;
                Ok(self.builder.unary(UnaryOp::Neg, count, operand, start))
            }
            _ => self.postfix(),
        }
    }

    /// Consumes an int/float literal as a negative literal if one is next.
    fn try_negative_literal(&mut self) -> ParseResult<Option<&'a Expr<'a>>> {
        let token = match self.peek() {
            Some(t) => t,
            None => return Ok(None),
        };
        let span = token.span;
        let kind = match token.kind {
            TokenKind::Integer(magnitude) | TokenKind::HexInteger(magnitude) => {
                if magnitude > i64::MAX as u64 + 1 {
                    return Err(self.int_range_error(span, magnitude, true));
                }
                ExprKind::Literal(Literal::Int((magnitude as i128).wrapping_neg() as i64))
            }
            TokenKind::Float(value) => ExprKind::Literal(Literal::Double(-value)),
            _ => return Ok(None),
        };
        self.advance();
        Ok(Some(self.builder.alloc(kind, span)))
    }

    fn postfix(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut expr = self.atom()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let (field, field_span) = self.expect_identifier("field name after '.'")?;
                if self.check(&TokenKind::LParen) {
                    let args = self.call_args()?;
                    let span = Span::new(expr.span.start, self.previous_end());
                    expr = self.builder.alloc(
                        ExprKind::Method { object: expr, name: field, args },
                        span,
                    );
                } else {
                    let span = Span::new(expr.span.start, field_span.end);
                    expr = self
                        .builder
                        .alloc(ExprKind::Member { object: expr, field }, span);
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(&TokenKind::RBracket, "']' after index")?;
                let span = Span::new(expr.span.start, self.previous_end());
                expr = self
                    .builder
                    .alloc(ExprKind::Index { object: expr, index }, span);
            } else {
                return Ok(expr);
            }
        }
    }

    fn atom(&mut self) -> ParseResult<&'a Expr<'a>> {
        let token = match self.peek() {
            Some(t) => t.clone(),
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedEof { expected: "an expression" },
                    Span::new(self.end, self.end),
                ))
            }
        };
        let span = token.span;

        match token.kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')' to close '('")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.list_literal(),
            TokenKind::LBrace => self.map_literal(),
            TokenKind::Integer(magnitude) | TokenKind::HexInteger(magnitude) => {
                self.advance();
                if magnitude > i64::MAX as u64 {
                    return Err(self.int_range_error(span, magnitude, false));
                }
                Ok(self
                    .builder
                    .alloc(ExprKind::Literal(Literal::Int(magnitude as i64)), span))
            }
            TokenKind::UnsignedInteger(value) | TokenKind::HexUnsignedInteger(value) => {
                self.advance();
                Ok(self
                    .builder
                    .alloc(ExprKind::Literal(Literal::Uint(value)), span))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(self
                    .builder
                    .alloc(ExprKind::Literal(Literal::Double(value)), span))
            }
            TokenKind::StringLiteral(ref s) => {
                let s = self.builder.alloc_str(s);
                self.advance();
                Ok(self.builder.alloc(ExprKind::Literal(Literal::String(s)), span))
            }
            TokenKind::BytesLiteral(ref b) => {
                let b = self.builder.alloc_bytes(b.clone());
                self.advance();
                Ok(self.builder.alloc(ExprKind::Literal(Literal::Bytes(b)), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(self
                    .builder
                    .alloc(ExprKind::Literal(Literal::Bool(true)), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(self
                    .builder
                    .alloc(ExprKind::Literal(Literal::Bool(false)), span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.builder.alloc(ExprKind::Literal(Literal::Null), span))
            }
            TokenKind::Identifier(ref name) => {
                let name = self.builder.alloc_str(name);
                self.advance();
                if self.check(&TokenKind::LParen) {
                    let args = self.call_args()?;
                    let span = Span::new(span.start, self.previous_end());
                    Ok(self.builder.alloc(ExprKind::Call { name, args }, span))
                } else {
                    Ok(self.builder.alloc(ExprKind::Ident(name), span))
                }
            }
            ref other => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected: "an expression",
                    found: other.describe().to_string(),
                },
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Delimited forms: lists, maps, argument lists
    // ------------------------------------------------------------------

    fn list_literal(&mut self) -> ParseResult<&'a Expr<'a>> {
        let start = self.peek().unwrap().span.start;
        self.advance(); // '['
        let mut elements = Vec::new();
        loop {
            if self.eat(&TokenKind::RBracket) {
                break;
            }
            match self.expr() {
                Ok(element) => elements.push(element),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize(&TokenKind::RBracket);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBracket, "']' to close list")?;
                break;
            }
        }
        let span = Span::new(start, self.previous_end());
        let elements = self.builder.alloc_exprs(elements);
        Ok(self.builder.alloc(ExprKind::List(elements), span))
    }

    fn map_literal(&mut self) -> ParseResult<&'a Expr<'a>> {
        let start = self.peek().unwrap().span.start;
        self.advance(); // '{'
        let mut entries = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            match self.map_entry() {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize(&TokenKind::RBrace);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "'}' to close map")?;
                break;
            }
        }
        let span = Span::new(start, self.previous_end());
        let entries = self.builder.alloc_entries(entries);
        Ok(self.builder.alloc(ExprKind::Map(entries), span))
    }

    fn map_entry(&mut self) -> ParseResult<(&'a Expr<'a>, &'a Expr<'a>)> {
        let key = self.expr()?;
        self.expect(&TokenKind::Colon, "':' after map key")?;
        let value = self.expr()?;
        Ok((key, value))
    }

    fn call_args(&mut self) -> ParseResult<&'a [&'a Expr<'a>]> {
        self.advance(); // '('
        let mut args = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            match self.expr() {
                Ok(arg) => args.push(arg),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize(&TokenKind::RParen);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "')' to close argument list")?;
                break;
            }
        }
        Ok(self.builder.alloc_exprs(args))
    }

    /// Panic-mode recovery: skip ahead to the next comma or the closing
    /// delimiter at this nesting level so remaining elements still parse.
    fn synchronize(&mut self, closer: &TokenKind) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                kind if depth == 0 && (kind == closer || *kind == TokenKind::Comma) => return,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.current);
        if token.is_some() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> ParseResult<Span> {
        match self.peek() {
            Some(token) if &token.kind == kind => {
                let span = token.span;
                self.current += 1;
                Ok(span)
            }
            Some(token) => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected,
                    found: token.kind.describe().to_string(),
                },
                token.span,
            )),
            None => Err(ParseError::new(
                ParseErrorKind::UnexpectedEof { expected },
                Span::new(self.end, self.end),
            )),
        }
    }

    fn expect_identifier(&mut self, expected: &'static str) -> ParseResult<(&'a str, Span)> {
        match self.peek() {
            Some(token) => {
                if let TokenKind::Identifier(ref name) = token.kind {
                    let name = self.builder.alloc_str(name);
                    let span = token.span;
                    self.current += 1;
                    Ok((name, span))
                } else {
                    Err(ParseError::new(
                        ParseErrorKind::UnexpectedToken {
                            expected,
                            found: token.kind.describe().to_string(),
                        },
                        token.span,
                    ))
                }
            }
            None => Err(ParseError::new(
                ParseErrorKind::UnexpectedEof { expected },
                Span::new(self.end, self.end),
            )),
        }
    }

    /// End offset of the most recently consumed token.
    fn previous_end(&self) -> usize {
        self.tokens
            .get(self.current.wrapping_sub(1))
            .map(|t| t.span.end)
            .unwrap_or(self.end)
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            let span = self.peek().map(|t| t.span).unwrap_or(Span::new(self.end, self.end));
            return Err(ParseError::new(ParseErrorKind::NestingTooDeep, span));
        }
        Ok(())
    }

    fn int_range_error(&self, span: Span, magnitude: u64, negative: bool) -> ParseError {
        let literal = if negative {
            format!("-{magnitude}")
        } else {
            magnitude.to_string()
        };
        ParseError::new(ParseErrorKind::NumberOutOfRange { literal }, span)
    }
}
