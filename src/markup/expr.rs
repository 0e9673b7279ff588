//! Expression language seam and the built-in evaluator.
//!
//! Markup text may carry `{expression}` segments. The parser hands them to
//! an `ExpressionLanguage`, splices the evaluated text back into the
//! stream and re-scans. The built-in language covers literals, dotted
//! scope lookups, arithmetic and comparisons; embeddings swap in their own
//! implementation for anything richer.

use std::any::Any;
use std::fmt;

use crate::error::{Error, Result, SyntaxError};
use crate::types::Value;

use super::context::Context;

/// A compiled expression plus how many characters it consumed from the
/// stream, opening and closing braces included. The payload is private to
/// the language that produced it.
pub struct Parsed {
    pub consumed: usize,
    pub payload: Box<dyn Any>,
}

impl fmt::Debug for Parsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parsed")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

/// The pluggable expression collaborator.
///
/// `parse` sees the stream starting at a `{`; `offset` is that brace's
/// position in the packet, for error locations. A text that does not open
/// an expression at all must fail with `expected: "{"` so the caller can
/// treat the brace as literal text.
pub trait ExpressionLanguage {
    fn parse(&self, text: &[char], offset: usize) -> std::result::Result<Parsed, SyntaxError>;
    fn eval(&self, parsed: &Parsed, scope: &Context) -> Result<Value>;
}

// =============================================================================
// Built-in language
// =============================================================================

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Literals, scope lookups, `+ - * / %`, comparisons and parentheses.
#[derive(Default)]
pub struct BasicExpressions;

impl BasicExpressions {
    pub fn new() -> Self {
        BasicExpressions
    }
}

struct Scanner<'a> {
    text: &'a [char],
    pos: usize,
    offset: usize,
}

impl<'a> Scanner<'a> {
    fn error(&self, expected: &str) -> SyntaxError {
        let found = match self.text.get(self.pos) {
            Some(c) => c.to_string(),
            None => "end of input".to_string(),
        };
        SyntaxError {
            expected: expected.to_string(),
            found,
            location: self.offset + self.pos,
        }
    }

    fn peek(&self) -> Option<char> {
        self.text.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> std::result::Result<Expr, SyntaxError> {
        let left = self.additive()?;
        self.skip_ws();
        let op = match (self.peek(), self.text.get(self.pos + 1)) {
            (Some('='), Some('=')) => Some((Op::Eq, 2)),
            (Some('!'), Some('=')) => Some((Op::Ne, 2)),
            (Some('<'), Some('=')) => Some((Op::Le, 2)),
            (Some('>'), Some('=')) => Some((Op::Ge, 2)),
            (Some('<'), _) => Some((Op::Lt, 1)),
            (Some('>'), _) => Some((Op::Gt, 1)),
            _ => None,
        };
        match op {
            Some((op, width)) => {
                self.pos += width;
                let right = self.additive()?;
                Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn additive(&mut self) -> std::result::Result<Expr, SyntaxError> {
        let mut left = self.multiplicative()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('+') => Op::Add,
                Some('-') => Op::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> std::result::Result<Expr, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('*') => Op::Mul,
                Some('/') => Op::Div,
                Some('%') => Op::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> std::result::Result<Expr, SyntaxError> {
        self.skip_ws();
        if self.eat('-') {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> std::result::Result<Expr, SyntaxError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.skip_ws();
                if !self.eat(')') {
                    return Err(self.error(")"));
                }
                Ok(inner)
            }
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => out.push(c),
                        None => return Err(self.error("closing quote")),
                    }
                }
                Ok(Expr::Literal(Value::Str(out)))
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.pos += 1;
                }
                let digits: String = self.text[start..self.pos].iter().collect();
                match digits.parse::<f64>() {
                    Ok(n) => Ok(Expr::Literal(Value::Number(n))),
                    Err(_) => Err(self.error("number")),
                }
            }
            Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut path: Vec<String> = Vec::new();
                loop {
                    let start = self.pos;
                    while self.peek().is_some_and(|c| {
                        c.is_alphanumeric() || c == '_' || c == '$'
                    }) {
                        self.pos += 1;
                    }
                    if self.pos == start {
                        return Err(self.error("identifier"));
                    }
                    path.push(self.text[start..self.pos].iter().collect());
                    if !self.eat('.') {
                        break;
                    }
                }
                if path.len() == 1 {
                    match path[0].as_str() {
                        "true" => return Ok(Expr::Literal(Value::Bool(true))),
                        "false" => return Ok(Expr::Literal(Value::Bool(false))),
                        _ => {}
                    }
                }
                Ok(Expr::Path(path))
            }
            _ => Err(self.error("expression")),
        }
    }
}

fn eval_expr(expr: &Expr, scope: &Context) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        // Unknown bindings evaluate to the empty value, so missing props
        // splice as empty text instead of failing the whole packet.
        Expr::Path(path) => Ok(scope.get_path(path).unwrap_or(Value::Unit)),
        Expr::Neg(inner) => {
            let value = eval_expr(inner, scope)?;
            match value.as_number() {
                Some(n) => Ok(Value::Number(-n)),
                None => Err(Error::Eval(format!("cannot negate {value:?}"))),
            }
        }
        Expr::Binary(op, left, right) => {
            let l = eval_expr(left, scope)?;
            let r = eval_expr(right, scope)?;
            eval_binary(*op, l, r)
        }
    }
}

fn eval_binary(op: Op, l: Value, r: Value) -> Result<Value> {
    match op {
        Op::Add => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Number(a + b)),
            _ => Ok(Value::Str(format!("{}{}", l.splice_text(), r.splice_text()))),
        },
        Op::Sub | Op::Mul | Op::Div | Op::Rem => {
            let (a, b) = match (l.as_number(), r.as_number()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::Eval(format!(
                        "arithmetic needs numbers, got {l:?} and {r:?}"
                    )));
                }
            };
            Ok(Value::Number(match op {
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => a / b,
                Op::Rem => a % b,
                _ => unreachable!(),
            }))
        }
        Op::Eq => Ok(Value::Bool(l == r)),
        Op::Ne => Ok(Value::Bool(l != r)),
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let ord = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ord) = ord else {
                return Err(Error::Eval(format!(
                    "cannot compare {l:?} with {r:?}"
                )));
            };
            Ok(Value::Bool(match op {
                Op::Lt => ord == std::cmp::Ordering::Less,
                Op::Le => ord != std::cmp::Ordering::Greater,
                Op::Gt => ord == std::cmp::Ordering::Greater,
                Op::Ge => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            }))
        }
    }
}

impl ExpressionLanguage for BasicExpressions {
    fn parse(&self, text: &[char], offset: usize) -> std::result::Result<Parsed, SyntaxError> {
        let mut scanner = Scanner { text, pos: 0, offset };
        if !scanner.eat('{') {
            return Err(scanner.error("{"));
        }
        let expr = scanner.expr()?;
        scanner.skip_ws();
        if !scanner.eat('}') {
            return Err(scanner.error("}"));
        }
        Ok(Parsed {
            consumed: scanner.pos,
            payload: Box::new(expr),
        })
    }

    fn eval(&self, parsed: &Parsed, scope: &Context) -> Result<Value> {
        let expr = parsed
            .payload
            .downcast_ref::<Expr>()
            .ok_or_else(|| Error::Eval("foreign expression payload".to_string()))?;
        eval_expr(expr, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, scope: &Context) -> Result<Value> {
        let lang = BasicExpressions::new();
        let chars: Vec<char> = text.chars().collect();
        let parsed = lang.parse(&chars, 0)?;
        assert_eq!(parsed.consumed, chars.len());
        lang.eval(&parsed, scope)
    }

    #[test]
    fn test_arithmetic() {
        let scope = Context::new();
        assert_eq!(eval("{1+1}", &scope).unwrap(), Value::Number(2.0));
        assert_eq!(eval("{2 * 3 + 4}", &scope).unwrap(), Value::Number(10.0));
        assert_eq!(eval("{2 * (3 + 4)}", &scope).unwrap(), Value::Number(14.0));
        assert_eq!(eval("{-5 + 2}", &scope).unwrap(), Value::Number(-3.0));
        assert_eq!(eval("{7 % 4}", &scope).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_scope_lookup() {
        let scope = Context::new();
        scope.set("name", Value::Str("zed".into()));
        let mut map = indexmap::IndexMap::new();
        map.insert("size".to_string(), Value::Number(3.0));
        scope.set("cfg", Value::Map(map));

        assert_eq!(eval("{name}", &scope).unwrap(), Value::Str("zed".into()));
        assert_eq!(eval("{cfg.size + 1}", &scope).unwrap(), Value::Number(4.0));
        assert_eq!(eval("{missing}", &scope).unwrap(), Value::Unit);
    }

    #[test]
    fn test_strings_and_concat() {
        let scope = Context::new();
        assert_eq!(
            eval("{'a' + 'b'}", &scope).unwrap(),
            Value::Str("ab".into())
        );
        assert_eq!(
            eval("{'n=' + 2}", &scope).unwrap(),
            Value::Str("n=2".into())
        );
    }

    #[test]
    fn test_comparisons() {
        let scope = Context::new();
        assert_eq!(eval("{1 < 2}", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval("{2 <= 1}", &scope).unwrap(), Value::Bool(false));
        assert_eq!(eval("{'a' == 'a'}", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval("{true != false}", &scope).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_incomplete_is_flagged() {
        let lang = BasicExpressions::new();
        let chars: Vec<char> = "plain text".chars().collect();
        let err = lang.parse(&chars, 5).unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(err.location, 5);
    }

    #[test]
    fn test_unterminated_reports_close_brace() {
        let lang = BasicExpressions::new();
        let chars: Vec<char> = "{1+1".chars().collect();
        let err = lang.parse(&chars, 0).unwrap_err();
        assert!(!err.is_incomplete());
        assert_eq!(err.expected, "}");
    }

    #[test]
    fn test_consumed_excludes_trailing_text() {
        let lang = BasicExpressions::new();
        let chars: Vec<char> = "{1+1} tail".chars().collect();
        let parsed = lang.parse(&chars, 0).unwrap();
        assert_eq!(parsed.consumed, 5);
    }
}
