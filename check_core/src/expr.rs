//! # Expression Language
//!
//! A small, closed expression language evaluated against a [`Scope`]. It is
//! what lets a check or a record refer to values *by name*, rename them
//! (`edge = d - g1`) or derive them, without handing strings to any general
//! purpose evaluator.
//!
//! ## Grammar
//!
//! ```text
//! expr     := or
//! or       := and ("or" and)*
//! and      := not ("and" not)*
//! not      := "not" not | cmp
//! cmp      := sum (("<" | "<=" | ">" | ">=" | "==" | "!=") sum)?
//! sum      := term (("+" | "-") term)*
//! term     := unary (("*" | "/") unary)*
//! unary    := "-" unary | power
//! power    := atom (("^" | "**") unary)?
//! atom     := number | string | "true" | "false"
//!           | ident | ident "(" args ")" | "(" expr ")"
//! ```
//!
//! Functions: `min`, `max`, `abs`, `sqrt`, `floor`, `ceil`, `round`,
//! `qty(number, "unit")` and `to(quantity, "unit")`.
//!
//! ## Lists and bindings
//!
//! Contexts and overlays take comma separated lists such as
//! `"d, b, edge = d - (g1 + g2)"`. [`split_list`] splits on commas that are
//! not inside brackets or strings; [`parse_list`] turns each item into a
//! [`BindingSpec`].
//!
//! ```rust
//! use check_core::expr::{evaluate, parse_list};
//! use check_core::namespace::{Namespace, Value};
//!
//! let ns: Namespace = [("d", 102.0), ("g1", 65.0)].into_iter().collect();
//! assert_eq!(evaluate("d - g1", &ns).unwrap(), Value::Number(37.0));
//!
//! let specs = parse_list("d, edge = d - g1").unwrap();
//! assert_eq!(specs[1].target, "edge");
//! assert_eq!(specs[1].expression.eval(&ns).unwrap(), Value::Number(37.0));
//! ```

use std::fmt;

use crate::errors::{CalcError, CalcResult};
use crate::namespace::{Scope, Value};
use crate::units::{Quantity, Unit};

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    And,
    Or,
    Not,
    True,
    False,
}

fn tokenize(src: &str) -> CalcResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| CalcError::expression(src, format!("invalid number '{text}'")))?;
            tokens.push(Token::Number(n));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != c {
                j += 1;
            }
            if j >= chars.len() {
                return Err(CalcError::expression(src, "unterminated string"));
            }
            tokens.push(Token::Str(chars[start..j].iter().collect()));
            i = j + 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::Caret, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('^', _) => (Token::Caret, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            _ => return Err(CalcError::expression(src, format!("unexpected character '{c}'"))),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

// ============================================================================
// Syntax Tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Name(String),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: impl Into<String>) -> CalcError {
        CalcError::expression(self.src, reason)
    }

    fn parse_or(&mut self) -> CalcResult<Node> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Node::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> CalcResult<Node> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Node::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> CalcResult<Node> {
        if self.eat(&Token::Not) {
            return Ok(Node::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> CalcResult<Node> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_sum()?;
        Ok(Node::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_sum(&mut self) -> CalcResult<Node> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_term(&mut self) -> CalcResult<Node> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> CalcResult<Node> {
        if self.eat(&Token::Minus) {
            return Ok(Node::Neg(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> CalcResult<Node> {
        let base = self.parse_atom()?;
        if self.eat(&Token::Caret) {
            // right associative: 2^3^2 == 2^(3^2)
            let exponent = self.parse_unary()?;
            return Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> CalcResult<Node> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Node::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Node::Literal(Value::Text(s))),
            Some(Token::True) => Ok(Node::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Node::Literal(Value::Bool(false))),
            Some(Token::Ident(name)) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Node::Name(name));
                }
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        if !self.eat(&Token::Comma) {
                            return Err(self.error(format!("expected ',' or ')' in call to {name}")));
                        }
                    }
                }
                Ok(Node::Call(name, args))
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("missing ')'"));
                }
                Ok(inner)
            }
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

// ============================================================================
// Expression
// ============================================================================

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse an expression
    pub fn parse(src: &str) -> CalcResult<Self> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(CalcError::expression(src, "empty expression"));
        }
        let mut parser = Parser { src, tokens, pos: 0 };
        let root = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error(format!(
                "unexpected trailing input {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(Expression {
            source: src.trim().to_string(),
            root,
        })
    }

    /// The source text, trimmed
    pub fn source(&self) -> &str {
        &self.source
    }

    /// If the expression is a single identifier, return it
    pub fn as_name(&self) -> Option<&str> {
        match &self.root {
            Node::Name(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Evaluate against a scope
    pub fn eval(&self, scope: &dyn Scope) -> CalcResult<Value> {
        Evaluator { src: &self.source, scope }.eval(&self.root)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and evaluate in one step
pub fn evaluate(src: &str, scope: &dyn Scope) -> CalcResult<Value> {
    Expression::parse(src)?.eval(scope)
}

struct Evaluator<'a> {
    src: &'a str,
    scope: &'a dyn Scope,
}

impl Evaluator<'_> {
    fn error(&self, reason: impl Into<String>) -> CalcError {
        CalcError::expression(self.src, reason)
    }

    fn eval(&self, node: &Node) -> CalcResult<Value> {
        match node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Name(name) => self
                .scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| CalcError::unknown_name(name)),
            Node::Neg(inner) => match self.eval(inner)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                Value::Quantity(q) => Ok(Value::Quantity(-q)),
                other => Err(self.error(format!("cannot negate a {}", other.type_name()))),
            },
            Node::Not(inner) => {
                let b = self.truth(&self.eval(inner)?)?;
                Ok(Value::Bool(!b))
            }
            Node::Binary(BinaryOp::And, lhs, rhs) => {
                if !self.truth(&self.eval(lhs)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.truth(&self.eval(rhs)?)?))
            }
            Node::Binary(BinaryOp::Or, lhs, rhs) => {
                if self.truth(&self.eval(lhs)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.truth(&self.eval(rhs)?)?))
            }
            Node::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                self.binary(*op, a, b)
            }
            Node::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<CalcResult<Vec<_>>>()?;
                self.call(name, values)
            }
        }
    }

    fn truth(&self, v: &Value) -> CalcResult<bool> {
        v.as_bool()
            .ok_or_else(|| self.error(format!("expected a boolean, found a {}", v.type_name())))
    }

    fn binary(&self, op: BinaryOp, a: Value, b: Value) -> CalcResult<Value> {
        use Value::{Number as N, Quantity as Q};

        let mismatch = |a: &Value, b: &Value| {
            self.error(format!(
                "unsupported operands for {:?}: {} and {}",
                op,
                a.type_name(),
                b.type_name()
            ))
        };

        match op {
            BinaryOp::Add => match (&a, &b) {
                (N(x), N(y)) => Ok(N(x + y)),
                (Q(x), Q(y)) => Ok(Q(x.checked_add(*y)?)),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOp::Sub => match (&a, &b) {
                (N(x), N(y)) => Ok(N(x - y)),
                (Q(x), Q(y)) => Ok(Q(x.checked_sub(*y)?)),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOp::Mul => match (&a, &b) {
                (N(x), N(y)) => Ok(N(x * y)),
                (Q(x), N(y)) | (N(y), Q(x)) => Ok(Q(*x * *y)),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOp::Div => {
                if b.as_number() == Some(0.0) {
                    return Err(self.error("division by zero"));
                }
                match (&a, &b) {
                    (N(x), N(y)) => Ok(N(x / y)),
                    (Q(x), N(y)) => Ok(Q(*x / *y)),
                    (Q(x), Q(y)) => Ok(N(x.ratio(*y)?)),
                    _ => Err(mismatch(&a, &b)),
                }
            }
            BinaryOp::Pow => match (&a, &b) {
                (N(x), N(y)) => Ok(N(x.powf(*y))),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = match (&a, &b) {
                    (N(x), N(y)) => x == y,
                    (Q(x), Q(y)) => x.to(y.unit)?.magnitude == y.magnitude,
                    (Value::Text(x), Value::Text(y)) => x == y,
                    (Value::Bool(x), Value::Bool(y)) => x == y,
                    _ => false,
                };
                Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (x, y) = match (&a, &b) {
                    (N(x), N(y)) => (*x, *y),
                    (Q(x), Q(y)) => (x.to(y.unit)?.magnitude, y.magnitude),
                    _ => return Err(mismatch(&a, &b)),
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => x < y,
                    BinaryOp::Le => x <= y,
                    BinaryOp::Gt => x > y,
                    _ => x >= y,
                }))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are handled in eval"),
        }
    }

    fn call(&self, name: &str, args: Vec<Value>) -> CalcResult<Value> {
        let arity = |n: usize| -> CalcResult<()> {
            if args.len() != n {
                return Err(self.error(format!("{name}() takes {n} argument(s), got {}", args.len())));
            }
            Ok(())
        };
        let number = |v: &Value| -> CalcResult<f64> {
            match v {
                Value::Number(n) => Ok(*n),
                other => Err(self.error(format!("{name}() expects a number, got a {}", other.type_name()))),
            }
        };
        let unit = |v: &Value| -> CalcResult<Unit> {
            v.as_text()
                .ok_or_else(|| self.error(format!("{name}() expects a unit symbol string")))?
                .parse()
        };

        match name {
            "min" | "max" => {
                if args.is_empty() {
                    return Err(self.error(format!("{name}() needs at least one argument")));
                }
                let mut best: Option<(f64, &Value)> = None;
                for arg in &args {
                    let key = arg
                        .comparable()
                        .ok_or_else(|| self.error(format!("{name}() expects numeric arguments")))?;
                    let replace = match best {
                        None => true,
                        Some((k, _)) if name == "min" => key < k,
                        Some((k, _)) => key > k,
                    };
                    if replace {
                        best = Some((key, arg));
                    }
                }
                best.map(|(_, v)| v.clone())
                    .ok_or_else(|| self.error(format!("{name}() needs at least one argument")))
            }
            "abs" => {
                arity(1)?;
                match &args[0] {
                    Value::Quantity(q) => Ok(Value::Quantity(Quantity::new(q.magnitude.abs(), q.unit))),
                    other => Ok(Value::Number(number(other)?.abs())),
                }
            }
            "sqrt" => {
                arity(1)?;
                let x = number(&args[0])?;
                if x < 0.0 {
                    return Err(self.error("sqrt() of a negative number"));
                }
                Ok(Value::Number(x.sqrt()))
            }
            "floor" => {
                arity(1)?;
                Ok(Value::Number(number(&args[0])?.floor()))
            }
            "ceil" => {
                arity(1)?;
                Ok(Value::Number(number(&args[0])?.ceil()))
            }
            "round" => {
                arity(1)?;
                Ok(Value::Number(number(&args[0])?.round()))
            }
            "qty" => {
                arity(2)?;
                Ok(Value::Quantity(Quantity::new(number(&args[0])?, unit(&args[1])?)))
            }
            "to" => {
                arity(2)?;
                let q = args[0]
                    .as_quantity()
                    .ok_or_else(|| self.error("to() expects a quantity"))?;
                Ok(Value::Quantity(q.to(unit(&args[1])?)?))
            }
            _ => Err(self.error(format!("unknown function '{name}'"))),
        }
    }
}

// ============================================================================
// Lists and Bindings
// ============================================================================

/// Split a comma separated list into items.
///
/// Commas inside brackets or quotes do not split. A `#` outside brackets and
/// quotes ends the list. Empty items are dropped.
pub fn split_list(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in s.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => items.push(std::mem::take(&mut current)),
            '#' if depth == 0 => break,
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// One item of a binding list: `name`, `target = expr`, or a bare expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSpec {
    /// Name the value is bound to. For a bare expression this is its source text.
    pub target: String,
    pub expression: Expression,
}

impl BindingSpec {
    /// Parse one list item
    pub fn parse(item: &str) -> CalcResult<Self> {
        if let Some(split) = assignment_split(item) {
            let target = item[..split].trim();
            let rhs = &item[split + 1..];
            if !is_identifier(target) {
                return Err(CalcError::expression(item, format!("'{target}' is not a valid name")));
            }
            return Ok(BindingSpec {
                target: target.to_string(),
                expression: Expression::parse(rhs)?,
            });
        }
        let expression = Expression::parse(item)?;
        Ok(BindingSpec {
            target: expression.source().to_string(),
            expression,
        })
    }

    /// True when the target is a plain identifier
    pub fn is_named(&self) -> bool {
        is_identifier(&self.target)
    }
}

/// Parse every item of a comma separated binding list
pub fn parse_list(s: &str) -> CalcResult<Vec<BindingSpec>> {
    split_list(s).iter().map(|item| BindingSpec::parse(item)).collect()
}

/// True for `[A-Za-z_][A-Za-z0-9_]*` style names (unicode letters allowed)
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Byte index of a lone `=` (not part of `==`, `<=`, `>=`, `!=`) outside quotes
fn assignment_split(item: &str) -> Option<usize> {
    let bytes = item.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'=' => {
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                let next = bytes.get(i + 1).copied().unwrap_or(b' ');
                if next != b'=' && !matches!(prev, b'<' | b'>' | b'!' | b'=') {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
