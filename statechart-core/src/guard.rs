//! Guard expression language of the default evaluator.
//!
//! Guards are boolean expressions over the data model, the current event and
//! the active configuration. The language supports:
//!
//! - `ctx.field` - data model field access (truthy check)
//! - `ctx.field.nested` - nested field access
//! - `event.name`, `event.origin`, `event.data.field` - current event access
//! - `ctx.field == value` - equality (strings, numbers, booleans, null)
//! - `ctx.field != value` - inequality
//! - `ctx.field > value`, `>=`, `<`, `<=` - numeric comparison
//! - `in("state")` - true while the named state is active
//! - `!expr` - logical NOT
//! - `expr && expr` - logical AND (higher precedence than OR)
//! - `expr || expr` - logical OR
//! - `(expr)` - grouping for precedence control
//!
//! Examples:
//! - `ctx.enabled` - true if enabled is truthy
//! - `event.data.amount > 100 && ctx.approved` - compound condition
//! - `in("b") && !ctx.locked`

use crate::error::EvaluationError;
use crate::evaluator::Scope;
use serde_json::Value;

/// A reference to a value visible to guards.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// Path into the data model (`ctx.a.b` -> `a.b`).
    Ctx(String),
    /// Path into the current event (`event.data.a` -> `data.a`).
    Event(String),
}

impl FieldRef {
    /// Resolves the reference. Missing fields resolve to `null`.
    pub fn resolve(&self, scope: &Scope<'_>) -> Value {
        match self {
            FieldRef::Ctx(path) => get_path(scope.data, path),
            FieldRef::Event(path) => {
                let Some(event) = scope.event else {
                    return Value::Null;
                };
                let (head, rest) = match path.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (path.as_str(), None),
                };
                match (head, rest) {
                    ("name", None) => Value::String(event.name.clone()),
                    ("origin", None) => serde_json::to_value(event.origin).unwrap_or(Value::Null),
                    ("send_id", None) => event
                        .send_id
                        .clone()
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                    ("data", None) => event.payload.clone(),
                    ("data", Some(rest)) => get_path(&event.payload, rest),
                    _ => Value::Null,
                }
            }
        }
    }

    /// Parses a bare reference such as `ctx.a.b` or `event.data.x`.
    pub fn parse(s: &str) -> Result<Self, EvaluationError> {
        let mut parser = Parser::new(s.trim());
        let field = parser.parse_field()?;
        parser.expect_end()?;
        Ok(field)
    }
}

/// A parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardExpr {
    /// Field is truthy.
    Truthy(FieldRef),
    /// Equality comparison.
    Eq(FieldRef, Value),
    /// Inequality comparison.
    Ne(FieldRef, Value),
    /// Greater than.
    Gt(FieldRef, f64),
    /// Greater or equal.
    Ge(FieldRef, f64),
    /// Less than.
    Lt(FieldRef, f64),
    /// Less or equal.
    Le(FieldRef, f64),
    /// Named state is active.
    In(String),
    /// Logical AND.
    And(Box<GuardExpr>, Box<GuardExpr>),
    /// Logical OR.
    Or(Box<GuardExpr>, Box<GuardExpr>),
    /// Logical NOT.
    Not(Box<GuardExpr>),
}

impl GuardExpr {
    /// Parses a guard expression from a string.
    pub fn parse(s: &str) -> Result<Self, EvaluationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EvaluationError::new("empty guard expression"));
        }

        let mut parser = Parser::new(s);
        let expr = parser.parse_expr()?;
        parser.expect_end()?;
        Ok(expr)
    }

    /// Evaluates the guard in a scope.
    pub fn evaluate(&self, scope: &Scope<'_>) -> bool {
        match self {
            GuardExpr::Truthy(field) => is_truthy(&field.resolve(scope)),
            GuardExpr::Eq(field, expected) => values_equal(&field.resolve(scope), expected),
            GuardExpr::Ne(field, expected) => !values_equal(&field.resolve(scope), expected),
            GuardExpr::Gt(field, expected) => compare(field, scope, |v| v > *expected),
            GuardExpr::Ge(field, expected) => compare(field, scope, |v| v >= *expected),
            GuardExpr::Lt(field, expected) => compare(field, scope, |v| v < *expected),
            GuardExpr::Le(field, expected) => compare(field, scope, |v| v <= *expected),
            GuardExpr::In(state) => scope.is_in(state),
            GuardExpr::And(left, right) => left.evaluate(scope) && right.evaluate(scope),
            GuardExpr::Or(left, right) => left.evaluate(scope) || right.evaluate(scope),
            GuardExpr::Not(inner) => !inner.evaluate(scope),
        }
    }
}

fn compare(field: &FieldRef, scope: &Scope<'_>, op: impl Fn(f64) -> bool) -> bool {
    as_f64(&field.resolve(scope)).map(op).unwrap_or(false)
}

/// Reads a dotted path out of a JSON value.
pub(crate) fn get_path(root: &Value, path: &str) -> Value {
    let mut current = root;

    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part).unwrap_or(&Value::Null);
            }
            _ => return Value::Null,
        }
    }

    current.clone()
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(a, b)| (a - b).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Simple recursive descent parser for guard expressions.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<GuardExpr, EvaluationError> {
        self.parse_or()
    }

    fn expect_end(&mut self) -> Result<(), EvaluationError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(EvaluationError::new(format!(
                "unexpected input at offset {}: '{}'",
                self.pos,
                &self.input[self.pos..]
            )));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<GuardExpr, EvaluationError> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();

        while self.peek_str("||") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_and()?;
            left = GuardExpr::Or(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<GuardExpr, EvaluationError> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();

        while self.peek_str("&&") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_unary()?;
            left = GuardExpr::And(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<GuardExpr, EvaluationError> {
        self.skip_whitespace();

        if self.peek_char() == Some('!') {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_unary()?; // Recursive to allow !!ctx.a
            return Ok(GuardExpr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_comparison(&mut self) -> Result<GuardExpr, EvaluationError> {
        self.skip_whitespace();
        let field = self.parse_field()?;
        self.skip_whitespace();

        if self.peek_str("==") {
            self.pos += 2;
            let value = self.parse_value()?;
            return Ok(GuardExpr::Eq(field, value));
        }

        if self.peek_str("!=") {
            self.pos += 2;
            let value = self.parse_value()?;
            return Ok(GuardExpr::Ne(field, value));
        }

        if self.peek_str(">=") {
            self.pos += 2;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Ge(field, num));
        }

        if self.peek_str("<=") {
            self.pos += 2;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Le(field, num));
        }

        if self.peek_char() == Some('>') {
            self.pos += 1;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Gt(field, num));
        }

        if self.peek_char() == Some('<') {
            self.pos += 1;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Lt(field, num));
        }

        // No operator, just truthy check
        Ok(GuardExpr::Truthy(field))
    }

    fn parse_primary(&mut self) -> Result<GuardExpr, EvaluationError> {
        self.skip_whitespace();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err(EvaluationError::new("expected ')'"));
            }
            self.pos += 1;
            return Ok(expr);
        }

        if self.peek_str("in(") || self.peek_str("In(") {
            return self.parse_in();
        }

        self.parse_comparison()
    }

    fn parse_in(&mut self) -> Result<GuardExpr, EvaluationError> {
        self.pos += 3;
        self.skip_whitespace();
        let state = match self.parse_string_value() {
            Ok(Value::String(s)) => s,
            _ => return Err(EvaluationError::new("in() expects a quoted state name")),
        };
        self.skip_whitespace();
        if self.peek_char() != Some(')') {
            return Err(EvaluationError::new("expected ')' after in() argument"));
        }
        self.pos += 1;
        Ok(GuardExpr::In(state))
    }

    fn parse_field(&mut self) -> Result<FieldRef, EvaluationError> {
        let prefix_len = if self.peek_str("ctx.") {
            4
        } else if self.peek_str("event.") {
            6
        } else {
            return Err(EvaluationError::new(
                "field must start with 'ctx.' or 'event.'",
            ));
        };
        let start = self.pos + prefix_len;
        self.pos = start;

        // Parse field name (including nested dots)
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        let path = &self.input[start..self.pos];
        if path.is_empty() || path.starts_with('.') || path.ends_with('.') {
            return Err(EvaluationError::new(format!(
                "invalid field name '{}'",
                path
            )));
        }

        Ok(if prefix_len == 4 {
            FieldRef::Ctx(path.to_string())
        } else {
            FieldRef::Event(path.to_string())
        })
    }

    fn parse_value(&mut self) -> Result<Value, EvaluationError> {
        self.skip_whitespace();

        let rest = &self.input[self.pos..];

        if rest.starts_with("true") {
            self.pos += 4;
            return Ok(Value::Bool(true));
        }
        if rest.starts_with("false") {
            self.pos += 5;
            return Ok(Value::Bool(false));
        }
        if rest.starts_with("null") {
            self.pos += 4;
            return Ok(Value::Null);
        }

        if rest.starts_with('"') || rest.starts_with('\'') {
            return self.parse_string_value();
        }

        let num = self.parse_number()?;
        serde_json::Number::from_f64(num)
            .map(Value::Number)
            .ok_or_else(|| EvaluationError::new(format!("number out of range: {}", num)))
    }

    fn parse_string_value(&mut self) -> Result<Value, EvaluationError> {
        let quote = match self.peek_char() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(EvaluationError::new("expected string")),
        };
        self.pos += 1;

        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == quote {
                let s = &self.input[start..self.pos];
                self.pos += 1;
                return Ok(Value::String(s.to_string()));
            }
            if c == '\\' {
                self.pos += 1;
                if let Some(escaped) = self.peek_char() {
                    self.pos += escaped.len_utf8();
                }
            } else {
                self.pos += c.len_utf8();
            }
        }

        Err(EvaluationError::new("unterminated string"))
    }

    fn parse_number(&mut self) -> Result<f64, EvaluationError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.pos += 1;
        }

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.peek_char() == Some('.') {
            self.pos += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| EvaluationError::new(format!("invalid number: '{}'", num_str)))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}
