//! Condition expressions evaluated over instance variables.
//!
//! The language is a deliberately small, side-effect-free subset:
//!
//! ```text
//! expr    := or
//! or      := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | compare
//! compare := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//! primary := number | string | true | false | null | path | "(" expr ")"
//! path    := ident ("." ident)*
//! ```
//!
//! Paths look up `instance.variables`; a missing variable reads as `null`.
//! Ordering comparisons involving `null` or mismatched types are false.
//! A numeric string compared against a number is compared numerically,
//! since form data usually arrives as strings.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::CoreError;

/// Keyword that marks an unconditional (fallback) branch.
pub const DEFAULT_BRANCH: &str = "default";

/// Longest accepted condition text, in characters.
pub const MAX_CONDITION_LEN: usize = 1000;

/// Deepest accepted nesting of parentheses and negations.
pub const MAX_NESTING_DEPTH: usize = 64;

/// A parsed condition, ready to evaluate any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expr: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Literal),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    Not,
    And,
    Or,
    Cmp(CmpOp),
}

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    /// Arrays and objects: truthy, equal to nothing.
    Opaque,
}

impl Condition {
    /// Parse a condition. Empty text and `default` parse to an always-true condition.
    pub fn parse(source: &str) -> Result<Self, CoreError> {
        let trimmed = source.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(DEFAULT_BRANCH) {
            return Ok(Self { expr: None });
        }

        if trimmed.chars().count() > MAX_CONDITION_LEN {
            return Err(CoreError::BadDefinition(format!(
                "Condition expression is longer than {MAX_CONDITION_LEN} characters"
            )));
        }

        let tokens = tokenize(trimmed).map_err(|e| invalid(source, &e))?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or().map_err(|e| invalid(source, &e))?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid(source, "unexpected trailing input"));
        }
        Ok(Self { expr: Some(expr) })
    }

    /// Whether this condition holds regardless of variables.
    pub fn is_unconditional(&self) -> bool {
        self.expr.is_none()
    }

    /// Evaluate against a variable map.
    pub fn evaluate(&self, vars: &Map<String, Value>) -> bool {
        match &self.expr {
            None => true,
            Some(expr) => truthy(&eval(expr, vars)),
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(source: &str, vars: &Map<String, Value>) -> Result<bool, CoreError> {
    Ok(Condition::parse(source)?.evaluate(vars))
}

fn invalid(source: &str, reason: &str) -> CoreError {
    CoreError::BadDefinition(format!(
        "Invalid condition expression '{source}': {reason}"
    ))
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Cmp(CmpOp::Le));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Cmp(CmpOp::Lt));
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Cmp(CmpOp::Ge));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Cmp(CmpOp::Gt));
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
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| "unterminated string literal".to_string())?;
                            value.push(*escaped);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => {
                        if word.ends_with('.') || word.contains("..") {
                            return Err(format!("invalid variable path '{word}'"));
                        }
                        Token::Ident(word)
                    }
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(format!("nesting deeper than {MAX_NESTING_DEPTH} levels"));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, String> {
        let left = self.parse_primary()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Literal(Literal::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Literal::Null)),
            Some(Token::Ident(path)) => Ok(Expr::Path(
                path.split('.').map(str::to_string).collect(),
            )),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, vars: &Map<String, Value>) -> Operand {
    match expr {
        Expr::Literal(lit) => match lit {
            Literal::Num(n) => Operand::Num(*n),
            Literal::Str(s) => Operand::Str(s.clone()),
            Literal::Bool(b) => Operand::Bool(*b),
            Literal::Null => Operand::Null,
        },
        Expr::Path(segments) => lookup(segments, vars),
        Expr::Not(inner) => Operand::Bool(!truthy(&eval(inner, vars))),
        Expr::And(l, r) => Operand::Bool(truthy(&eval(l, vars)) && truthy(&eval(r, vars))),
        Expr::Or(l, r) => Operand::Bool(truthy(&eval(l, vars)) || truthy(&eval(r, vars))),
        Expr::Compare(l, op, r) => Operand::Bool(compare(&eval(l, vars), *op, &eval(r, vars))),
    }
}

fn lookup(segments: &[String], vars: &Map<String, Value>) -> Operand {
    let mut current = match segments.first().and_then(|first| vars.get(first)) {
        Some(value) => value,
        None => return Operand::Null,
    };
    for segment in &segments[1..] {
        current = match current.get(segment) {
            Some(value) => value,
            None => return Operand::Null,
        };
    }
    match current {
        Value::Null => Operand::Null,
        Value::Bool(b) => Operand::Bool(*b),
        Value::Number(n) => n.as_f64().map(Operand::Num).unwrap_or(Operand::Null),
        Value::String(s) => Operand::Str(s.clone()),
        Value::Array(_) | Value::Object(_) => Operand::Opaque,
    }
}

fn truthy(value: &Operand) -> bool {
    match value {
        Operand::Bool(b) => *b,
        Operand::Num(n) => *n != 0.0,
        Operand::Str(s) => !s.is_empty(),
        Operand::Null => false,
        Operand::Opaque => true,
    }
}

fn compare(left: &Operand, op: CmpOp, right: &Operand) -> bool {
    let ordering = match (left, right) {
        (Operand::Num(a), Operand::Num(b)) => a.partial_cmp(b),
        (Operand::Num(a), Operand::Str(b)) => b.trim().parse::<f64>().ok().and_then(|b| a.partial_cmp(&b)),
        (Operand::Str(a), Operand::Num(b)) => a.trim().parse::<f64>().ok().and_then(|a| a.partial_cmp(b)),
        (Operand::Str(a), Operand::Str(b)) => Some(a.cmp(b)),
        (Operand::Bool(a), Operand::Bool(b)) => {
            return equality_only(op, a == b);
        }
        (Operand::Null, Operand::Null) => return equality_only(op, true),
        _ => None,
    };

    match ordering {
        Some(ord) => match op {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        },
        // Incomparable operands are unequal and unordered.
        None => op == CmpOp::Ne,
    }
}

fn equality_only(op: CmpOp, equal: bool) -> bool {
    match op {
        CmpOp::Eq => equal,
        CmpOp::Ne => !equal,
        _ => false,
    }
}
