//! Condition micro-expression evaluator for `if` nodes.
//!
//! Conditions are written as `${...}` expression strings over a fixed
//! variable namespace (caller number, time-of-day, call metadata), e.g.
//!
//! - `${caller.number == '+1234567890'}`
//! - `${hour >= 9 && hour < 17}`
//!
//! The grammar is deliberately narrow: dotted variable paths, string /
//! number / boolean literals, comparisons (`==`, `!=`, `<`, `<=`, `>`,
//! `>=`), boolean combinators (`&&`, `||`, `!`) and parentheses. This is
//! not a scripting language. Unresolved variables evaluate to null;
//! malformed expressions are a recoverable per-call condition error,
//! never a crash.

use regex::Regex;
use serde_json::Value;

use crate::{CallflowError, Result, common::Vars};

/// Pattern matching a condition fully wrapped as `${ ... }`.
const WRAPPED_CONDITION_PATTERN: &str = r"^\s*\$\{(.*)\}\s*$";

/// Evaluate a condition string against the call's variables.
pub fn evaluate(
    condition: &str,
    vars: &Vars,
) -> Result<bool> {
    let re = Regex::new(WRAPPED_CONDITION_PATTERN).unwrap();
    let source = match re.captures(condition) {
        Some(caps) => caps.get(1).unwrap().as_str().to_string(),
        None => condition.to_string(),
    };

    let tokens = tokenize(&source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        vars,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(CallflowError::Condition(format!("unexpected trailing input in '{}'", condition)));
    }
    Ok(truthy(&value))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(CallflowError::Condition(format!("unterminated string literal in '{}'", source)));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| CallflowError::Condition(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(CallflowError::Condition(format!("unexpected character '{}' in '{}'", other, source)));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a Vars,
}

impl Parser<'_> {
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

    fn parse_or(&mut self) -> Result<Value> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.bump();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.bump();
            let right = self.parse_comparison()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Value> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) | Some(Token::Ne) | Some(Token::Lt) | Some(Token::Le) | Some(Token::Gt) | Some(Token::Ge) => self.bump().unwrap(),
            _ => return Ok(left),
        };
        let right = self.parse_unary()?;

        let result = match op {
            Token::Eq => values_eq(&left, &right),
            Token::Ne => !values_eq(&left, &right),
            Token::Lt => compare_numeric(&left, &right, |a, b| a < b)?,
            Token::Le => compare_numeric(&left, &right, |a, b| a <= b)?,
            Token::Gt => compare_numeric(&left, &right, |a, b| a > b)?,
            Token::Ge => compare_numeric(&left, &right, |a, b| a >= b)?,
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }

    fn parse_unary(&mut self) -> Result<Value> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value> {
        match self.bump() {
            Some(Token::Ident(path)) => Ok(self.vars.get_path(&path).unwrap_or(Value::Null)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(serde_json::json!(n)),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                if self.bump() != Some(Token::RParen) {
                    return Err(CallflowError::Condition("missing closing parenthesis".to_string()));
                }
                Ok(value)
            }
            other => Err(CallflowError::Condition(format!("unexpected token {:?}", other))),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_eq(
    left: &Value,
    right: &Value,
) -> bool {
    match (left, right) {
        // numbers compare numerically even against numeric strings
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare_numeric(
    left: &Value,
    right: &Value,
    cmp: impl Fn(f64, f64) -> bool,
) -> Result<bool> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => Ok(cmp(a, b)),
        _ => Err(CallflowError::Condition(format!("cannot order {:?} against {:?}", left, right))),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
