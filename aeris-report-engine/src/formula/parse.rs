//! Formula parser: tokenizer plus recursive descent with the usual
//! precedence ladder (comparison < additive < multiplicative < unary).
//!
//! Parsing happens once, at compile time; execution interprets the AST per
//! row and never re-parses. Errors carry the byte offset of the offending
//! token so a report builder can point at the problem.

use aeris_report_core::ScalarValue;

use super::ast::{BinOp, Expr, Func, UnaryOp};
use super::FormulaError;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(ScalarValue),
    Str(String),
    Ident(String),
    /// `[...]`-quoted column name, taken verbatim.
    QuotedColumn(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, pos: start });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, pos: start });
                i += 1;
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Comma, pos: start });
                i += 1;
            }
            '.' => {
                tokens.push(Token { kind: TokenKind::Dot, pos: start });
                i += 1;
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, pos: start });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, pos: start });
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Star, pos: start });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, pos: start });
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::EqEq, pos: start });
                    i += 2;
                } else {
                    return Err(FormulaError::at(start, "expected '==', found lone '='"));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::NotEq, pos: start });
                    i += 2;
                } else {
                    return Err(FormulaError::at(start, "expected '!=', found lone '!'"));
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::LtEq, pos: start });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, pos: start });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::GtEq, pos: start });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, pos: start });
                    i += 1;
                }
            }
            '"' => {
                let (s, next) = lex_string(input, i)?;
                tokens.push(Token { kind: TokenKind::Str(s), pos: start });
                i = next;
            }
            '[' => {
                let end = input[i + 1..]
                    .find(']')
                    .ok_or_else(|| FormulaError::at(start, "unterminated '[' column reference"))?;
                let name = input[i + 1..i + 1 + end].trim().to_owned();
                if name.is_empty() {
                    return Err(FormulaError::at(start, "empty '[]' column reference"));
                }
                tokens.push(Token { kind: TokenKind::QuotedColumn(name), pos: start });
                i = i + 1 + end + 1;
            }
            _ if c.is_ascii_digit() => {
                let (value, next) = lex_number(input, i)?;
                tokens.push(Token { kind: TokenKind::Number(value), pos: start });
                i = next;
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
                {
                    j += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[i..j].to_owned()),
                    pos: start,
                });
                i = j;
            }
            _ => {
                return Err(FormulaError::at(start, format!("unexpected character '{c}'")));
            }
        }
    }
    Ok(tokens)
}

fn lex_string(input: &str, open: usize) -> Result<(String, usize), FormulaError> {
    let mut out = String::new();
    let mut chars = input[open + 1..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '"' => return Ok((out, open + 1 + offset + 1)),
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => return Err(FormulaError::at(open, "unterminated string literal")),
            },
            _ => out.push(c),
        }
    }
    Err(FormulaError::at(open, "unterminated string literal"))
}

fn lex_number(input: &str, start: usize) -> Result<(ScalarValue, usize), FormulaError> {
    let bytes = input.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut is_double = false;
    if i < bytes.len()
        && bytes[i] == b'.'
        && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
    {
        is_double = true;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text = &input[start..i];
    let value = if is_double {
        text.parse::<f64>()
            .map(ScalarValue::Double)
            .map_err(|_| FormulaError::at(start, format!("invalid number '{text}'")))?
    } else {
        text.parse::<i64>()
            .map(ScalarValue::Long)
            .map_err(|_| FormulaError::at(start, format!("number '{text}' out of range")))?
    };
    Ok((value, i))
}

/// Parse a formula into its AST.
pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
    };
    let expr = parser.comparison()?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::at(
            token.pos,
            "unexpected trailing input after expression",
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eof_error(&self, expected: &str) -> FormulaError {
        FormulaError::at(self.input_len, format!("unexpected end of formula, expected {expected}"))
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), FormulaError> {
        match self.bump() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(FormulaError::at(token.pos, format!("expected {expected}"))),
            None => Err(self.eof_error(expected)),
        }
    }

    /// Non-associative comparison layer: at most one comparison per
    /// expression level, so `a == b == c` is rejected rather than guessed.
    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        let left = self.additive()?;
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::EqEq) => Some(BinOp::Eq),
            Some(TokenKind::NotEq) => Some(BinOp::NotEq),
            Some(TokenKind::Lt) => Some(BinOp::Lt),
            Some(TokenKind::LtEq) => Some(BinOp::LtEq),
            Some(TokenKind::Gt) => Some(BinOp::Gt),
            Some(TokenKind::GtEq) => Some(BinOp::GtEq),
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let right = self.additive()?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            None => Ok(left),
        }
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.multiplicative()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                _ => break,
            };
            self.bump();
            let right = self.unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Minus)) {
            self.bump();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let token = self.bump().ok_or_else(|| self.eof_error("an expression"))?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Literal(value)),
            TokenKind::Str(s) => Ok(Expr::Literal(ScalarValue::String(s))),
            TokenKind::QuotedColumn(name) => Ok(Expr::Column(name)),
            TokenKind::LParen => {
                let expr = self.comparison()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => self.ident_tail(name, token.pos),
            _ => Err(FormulaError::at(token.pos, "expected an expression")),
        }
    }

    /// An identifier is a literal keyword, a function call, or a (possibly
    /// dotted) column reference.
    fn ident_tail(&mut self, name: String, pos: usize) -> Result<Expr, FormulaError> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(ScalarValue::Bool(true))),
            "false" => return Ok(Expr::Literal(ScalarValue::Bool(false))),
            "null" => return Ok(Expr::Literal(ScalarValue::Null)),
            _ => {}
        }

        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            let func = Func::from_name(&name).ok_or_else(|| {
                FormulaError::at(pos, format!("unknown function '{name}'"))
            })?;
            self.bump();
            let args = self.call_args()?;
            let (min, max) = func.arity();
            if args.len() < min || args.len() > max {
                let expected = if min == max {
                    format!("{min}")
                } else {
                    format!("{min}-{max}")
                };
                return Err(FormulaError::at(
                    pos,
                    format!(
                        "{}() takes {expected} argument(s), got {}",
                        func.name(),
                        args.len()
                    ),
                ));
            }
            return Ok(Expr::Call { func, args });
        }

        let mut column = name;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
            self.bump();
            match self.bump() {
                Some(Token {
                    kind: TokenKind::Ident(part),
                    ..
                }) => {
                    column.push('.');
                    column.push_str(&part);
                }
                Some(other) => {
                    return Err(FormulaError::at(other.pos, "expected identifier after '.'"))
                }
                None => return Err(self.eof_error("identifier after '.'")),
            }
        }
        Ok(Expr::Column(column))
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            match self.bump() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => {}
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => return Ok(args),
                Some(other) => {
                    return Err(FormulaError::at(other.pos, "expected ',' or ')'"))
                }
                None => return Err(self.eof_error("',' or ')'")),
            }
        }
    }
}
