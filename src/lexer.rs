//! Lexer for CEL source text.
//!
//! Produces the full token stream in one pass, accumulating lex errors
//! instead of stopping at the first, so the parser can report everything
//! wrong with an expression at once. Whitespace and `// ...` comments are
//! skipped. String escape processing happens here; the parser only sees
//! decoded payloads.

use crate::error::{ParseError, ParseErrorKind};
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'s> {
    source: &'s str,
    /// (byte offset, char) pairs, indexable for lookahead
    chars: Vec<(usize, char)>,
    pos: usize,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Lexes the whole input. Both the tokens recognized and every error
    /// encountered are returned; recovery skips the offending character.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<ParseError>) {
        while let Some(c) = self.peek(0) {
            let start = self.offset();
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '(' => self.punct(TokenKind::LParen),
                ')' => self.punct(TokenKind::RParen),
                '[' => self.punct(TokenKind::LBracket),
                ']' => self.punct(TokenKind::RBracket),
                '{' => self.punct(TokenKind::LBrace),
                '}' => self.punct(TokenKind::RBrace),
                ',' => self.punct(TokenKind::Comma),
                ':' => self.punct(TokenKind::Colon),
                '?' => self.punct(TokenKind::Question),
                '+' => self.punct(TokenKind::Plus),
                '-' => self.punct(TokenKind::Minus),
                '*' => self.punct(TokenKind::Star),
                '/' => self.punct(TokenKind::Slash),
                '%' => self.punct(TokenKind::Percent),
                '.' => self.punct(TokenKind::Dot),
                '=' if self.peek(1) == Some('=') => self.punct2(TokenKind::Eq),
                '!' if self.peek(1) == Some('=') => self.punct2(TokenKind::Neq),
                '!' => self.punct(TokenKind::Bang),
                '<' if self.peek(1) == Some('=') => self.punct2(TokenKind::Lte),
                '<' => self.punct(TokenKind::Lt),
                '>' if self.peek(1) == Some('=') => self.punct2(TokenKind::Gte),
                '>' => self.punct(TokenKind::Gt),
                '&' if self.peek(1) == Some('&') => self.punct2(TokenKind::And),
                '|' if self.peek(1) == Some('|') => self.punct2(TokenKind::Or),
                '\'' | '"' => self.lex_string(false, false, start),
                '0'..='9' => self.lex_number(),
                c if is_ident_start(c) => self.lex_word(),
                c => {
                    self.error(ParseErrorKind::UnexpectedChar { found: c }, start, self.offset_after(start));
                    self.bump();
                }
            }
        }
        (self.tokens, self.errors)
    }

    // ------------------------------------------------------------------
    // Cursor primitives
    // ------------------------------------------------------------------

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0);
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Byte offset of the current character (or end of input).
    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(off, _)| off)
            .unwrap_or(self.source.len())
    }

    fn offset_after(&self, start: usize) -> usize {
        self.chars
            .get(self.pos + 1)
            .map(|&(off, _)| off)
            .unwrap_or(self.source.len())
            .max(start + 1)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let end = self.offset();
        self.tokens.push(Token::new(kind, Span::new(start, end)));
    }

    fn error(&mut self, kind: ParseErrorKind, start: usize, end: usize) {
        self.errors.push(ParseError::new(kind, Span::new(start, end)));
    }

    fn punct(&mut self, kind: TokenKind) {
        let start = self.offset();
        self.bump();
        self.push(kind, start);
    }

    fn punct2(&mut self, kind: TokenKind) {
        let start = self.offset();
        self.bump();
        self.bump();
        self.push(kind, start);
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    // ------------------------------------------------------------------
    // Identifiers, keywords, string prefixes
    // ------------------------------------------------------------------

    fn lex_word(&mut self) {
        let start = self.offset();

        // r/R/b/B prefixes (in either order) directly before a quote start
        // a string literal, not an identifier.
        if let Some((raw, bytes, len)) = self.string_prefix() {
            for _ in 0..len {
                self.bump();
            }
            self.lex_string(raw, bytes, start);
            return;
        }

        let mut word = String::new();
        while let Some(c) = self.peek(0) {
            if is_ident_continue(c) {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let kind = match word.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "in" => TokenKind::In,
            _ => TokenKind::Identifier(word),
        };
        self.push(kind, start);
    }

    /// Detects `r"`, `b'`, `rb"`, `br'`, any case, either order.
    /// Returns (raw, bytes, prefix length in chars).
    fn string_prefix(&self) -> Option<(bool, bool, usize)> {
        let first = self.peek(0)?;
        let one = match first {
            'r' | 'R' => (true, false),
            'b' | 'B' => (false, true),
            _ => return None,
        };
        match self.peek(1) {
            Some('\'') | Some('"') => Some((one.0, one.1, 1)),
            Some(second @ ('r' | 'R' | 'b' | 'B')) => {
                let two = match second {
                    'r' | 'R' => (true, false),
                    _ => (false, true),
                };
                // rb / br only; rr and bb are identifiers
                if one == two {
                    return None;
                }
                match self.peek(2) {
                    Some('\'') | Some('"') => Some((true, true, 2)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Numbers
    // ------------------------------------------------------------------

    /// Integer magnitudes are carried unsigned; the parser applies range
    /// checks and sign folding so `-9223372036854775808` round-trips.
    fn lex_number(&mut self) {
        let start = self.offset();

        if self.peek(0) == Some('0') && self.peek(1) == Some('x') {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek(0) {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                self.error(
                    ParseErrorKind::NumberOutOfRange { literal: "0x".into() },
                    start,
                    self.offset(),
                );
                return;
            }
            let unsigned = self.eat_unsigned_suffix();
            match u64::from_str_radix(&digits, 16) {
                Ok(value) if unsigned => self.push(TokenKind::HexUnsignedInteger(value), start),
                Ok(value) => self.push(TokenKind::HexInteger(value), start),
                Err(_) => {
                    let literal = format!("0x{digits}");
                    self.error(ParseErrorKind::NumberOutOfRange { literal }, start, self.offset());
                }
            }
            return;
        }

        let mut digits = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }

        // Fractional part makes it a float; \d+\.\d+ is the only form.
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            let mut fraction = String::new();
            while let Some(c) = self.peek(0) {
                if c.is_ascii_digit() {
                    fraction.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let literal = format!("{digits}.{fraction}");
            match literal.parse::<f64>() {
                Ok(value) => self.push(TokenKind::Float(value), start),
                Err(_) => {
                    self.error(ParseErrorKind::NumberOutOfRange { literal }, start, self.offset())
                }
            }
            return;
        }

        if digits.len() > 1 && digits.starts_with('0') {
            self.error(ParseErrorKind::LeadingZero, start, self.offset());
            return;
        }

        let unsigned = self.eat_unsigned_suffix();
        match digits.parse::<u64>() {
            Ok(value) if unsigned => self.push(TokenKind::UnsignedInteger(value), start),
            Ok(value) => self.push(TokenKind::Integer(value), start),
            Err(_) => {
                self.error(ParseErrorKind::NumberOutOfRange { literal: digits }, start, self.offset())
            }
        }
    }

    fn eat_unsigned_suffix(&mut self) -> bool {
        if matches!(self.peek(0), Some('u') | Some('U')) {
            self.bump();
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Strings and bytes
    // ------------------------------------------------------------------

    fn lex_string(&mut self, raw: bool, bytes: bool, start: usize) {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => unreachable!("lex_string entered off a quote"),
        };

        let triple = self.peek(0) == Some(quote) && self.peek(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut text = String::new();
        let mut data = Vec::new();

        loop {
            let Some(c) = self.peek(0) else {
                self.error(ParseErrorKind::UnterminatedString, start, self.offset());
                return;
            };

            // Closing delimiter?
            if c == quote {
                if !triple {
                    self.bump();
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
                // a lone quote inside a triple-quoted string
                text.push(c);
                push_char(&mut data, c);
                self.bump();
                continue;
            }

            if c == '\n' && !triple {
                self.error(ParseErrorKind::UnterminatedString, start, self.offset());
                return;
            }

            if c == '\\' && !raw {
                if !self.lex_escape(bytes, &mut text, &mut data) {
                    // error already recorded; skip to end of literal
                    self.recover_string(quote, triple);
                    return;
                }
                continue;
            }

            text.push(c);
            push_char(&mut data, c);
            self.bump();
        }

        if bytes {
            if raw {
                // raw bytes: the source characters as UTF-8
                self.push(TokenKind::BytesLiteral(text.into_bytes()), start);
            } else {
                self.push(TokenKind::BytesLiteral(data), start);
            }
        } else {
            self.push(TokenKind::StringLiteral(text), start);
        }
    }

    /// Consumes one escape sequence after the backslash. Returns false if
    /// the escape was invalid (the error has been recorded).
    fn lex_escape(&mut self, bytes: bool, text: &mut String, data: &mut Vec<u8>) -> bool {
        let esc_start = self.offset();
        self.bump(); // the backslash

        let Some(c) = self.bump() else {
            self.error(ParseErrorKind::UnterminatedString, esc_start, self.offset());
            return false;
        };

        let simple = match c {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            '?' => Some('?'),
            '`' => Some('`'),
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0C'),
            'v' => Some('\x0B'),
            _ => None,
        };
        if let Some(ch) = simple {
            text.push(ch);
            push_char(data, ch);
            return true;
        }

        match c {
            'x' | 'X' => {
                let Some(value) = self.hex_digits(2) else {
                    self.error(
                        ParseErrorKind::InvalidEscape { sequence: c.to_string() },
                        esc_start,
                        self.offset(),
                    );
                    return false;
                };
                self.push_code_unit(value, bytes, text, data, esc_start)
            }
            '0'..='7' => {
                let mut value = c.to_digit(8).unwrap();
                for _ in 0..2 {
                    match self.peek(0).and_then(|d| d.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            self.bump();
                        }
                        None => break,
                    }
                }
                if value > 0xFF {
                    self.error(
                        ParseErrorKind::InvalidEscape { sequence: format!("{value:o}") },
                        esc_start,
                        self.offset(),
                    );
                    return false;
                }
                self.push_code_unit(value, bytes, text, data, esc_start)
            }
            'u' => match self.hex_digits(4) {
                Some(value) => self.push_code_point(value, bytes, text, data, esc_start),
                None => {
                    self.error(
                        ParseErrorKind::InvalidEscape { sequence: "u".into() },
                        esc_start,
                        self.offset(),
                    );
                    false
                }
            },
            'U' => match self.hex_digits(8) {
                Some(value) => self.push_code_point(value, bytes, text, data, esc_start),
                None => {
                    self.error(
                        ParseErrorKind::InvalidEscape { sequence: "U".into() },
                        esc_start,
                        self.offset(),
                    );
                    false
                }
            },
            other => {
                self.error(
                    ParseErrorKind::InvalidEscape { sequence: other.to_string() },
                    esc_start,
                    self.offset(),
                );
                false
            }
        }
    }

    /// `\xHH` and octal escapes: a byte in bytes literals, a code point in
    /// text strings.
    fn push_code_unit(
        &mut self,
        value: u32,
        bytes: bool,
        text: &mut String,
        data: &mut Vec<u8>,
        esc_start: usize,
    ) -> bool {
        if bytes {
            data.push(value as u8);
            return true;
        }
        match char::from_u32(value) {
            Some(ch) => {
                text.push(ch);
                true
            }
            None => {
                self.error(ParseErrorKind::InvalidCodePoint { value }, esc_start, self.offset());
                false
            }
        }
    }

    /// `\uHHHH` / `\UHHHHHHHH`: UTF-8 in text strings; in bytes literals
    /// only values that fit a single byte are accepted.
    fn push_code_point(
        &mut self,
        value: u32,
        bytes: bool,
        text: &mut String,
        data: &mut Vec<u8>,
        esc_start: usize,
    ) -> bool {
        if bytes {
            if value > 0xFF {
                self.error(
                    ParseErrorKind::EscapeNotAByte { code_point: value },
                    esc_start,
                    self.offset(),
                );
                return false;
            }
            data.push(value as u8);
            return true;
        }
        match char::from_u32(value) {
            Some(ch) => {
                text.push(ch);
                true
            }
            None => {
                self.error(ParseErrorKind::InvalidCodePoint { value }, esc_start, self.offset());
                false
            }
        }
    }

    fn hex_digits(&mut self, count: usize) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let digit = self.peek(0)?.to_digit(16)?;
            value = value * 16 + digit;
            self.bump();
        }
        Some(value)
    }

    /// After an escape error, skip to the closing delimiter so later
    /// tokens still lex.
    fn recover_string(&mut self, quote: char, triple: bool) {
        while let Some(c) = self.peek(0) {
            if c == quote {
                if !triple {
                    self.bump();
                    return;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return;
                }
            }
            if c == '\n' && !triple {
                return;
            }
            self.bump();
        }
    }
}

fn push_char(data: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    data.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}
