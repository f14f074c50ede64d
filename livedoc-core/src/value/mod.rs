//! Values
//!
//! Every state variable holds a [`Value`]: an immutable number, string,
//! boolean or symbolic math tree. Text a user types is turned into a value
//! by [`ValueKind::parse`]; text that does not parse becomes
//! [`Value::Unparseable`], so dependents always see a typed value instead of
//! an error.
//!
//! The submodules provide the rest of the value toolkit:
//!
//! - `expr`: expression trees, simplification, substitution, printing
//! - `parse`: the math text parser
//! - `format`: display rounding and serialization
//! - `solve`: solving an expression for one symbol

mod expr;
mod format;
mod parse;
mod solve;

pub use expr::{format_number, Expr, OpCode};
pub use format::{
    round_value, serialize, FormatOptions, ResolvedFormat, Rounding, DEFAULT_ZERO_THRESHOLD,
};
pub use parse::parse_math;
pub use solve::solve_for;

use std::fmt;

use serde::{Deserialize, Serialize};

/// An immutable state-variable value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Math(Expr),
    /// Text that failed to parse, kept verbatim.
    Unparseable(String),
    /// No value (a cleared input, an unset slot).
    Missing,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Math(a), Value::Math(b)) => a == b || a.simplify() == b.simplify(),
            (Value::Unparseable(a), Value::Unparseable(b)) => a == b,
            (Value::Missing, Value::Missing) => true,
            _ => false,
        }
    }
}

impl Value {
    pub fn math(expr: Expr) -> Self {
        Value::Math(expr)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    /// Whether the value carries no content.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Text(text) | Value::Unparseable(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, Value::Unparseable(_))
    }

    /// Numeric view of the value, `None` when it has no numeric meaning.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Math(expr) => expr.as_constant(),
            _ => None,
        }
    }

    /// Truth value used by trigger predicates.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Text(text) => text.trim().eq_ignore_ascii_case("true"),
            other => other.as_number().is_some_and(|n| n != 0.0 && !n.is_nan()),
        }
    }

    /// Expression view of the value for substitution into math.
    pub fn to_expr(&self) -> Option<Expr> {
        match self {
            Value::Math(expr) => Some(expr.clone()),
            Value::Number(n) => Some(Expr::Num(*n)),
            Value::Bool(b) => Some(Expr::Num(if *b { 1.0 } else { 0.0 })),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize(self, &ResolvedFormat::exact()))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<Expr> for Value {
    fn from(expr: Expr) -> Self {
        Value::Math(expr)
    }
}

/// The type a variable's values are normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Math,
    Number,
    Text,
    Boolean,
}

impl ValueKind {
    /// Parse user text. Failures become [`Value::Unparseable`].
    pub fn parse(self, text: &str) -> Value {
        let trimmed = text.trim();
        match self {
            ValueKind::Text => Value::Text(text.to_string()),
            _ if trimmed.is_empty() => Value::Missing,
            ValueKind::Math => match parse_math(trimmed) {
                Ok(expr) => Value::Math(expr),
                Err(_) => Value::Unparseable(text.to_string()),
            },
            ValueKind::Number => match trimmed.parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => match parse_math(trimmed) {
                    Ok(expr) => Value::Number(expr.as_constant().unwrap_or(f64::NAN)),
                    Err(_) => Value::Unparseable(text.to_string()),
                },
            },
            ValueKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Unparseable(text.to_string()),
            },
        }
    }

    /// Value of an input nobody has typed into.
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::Math => Value::Missing,
            ValueKind::Number => Value::Number(f64::NAN),
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::Boolean => Value::Bool(false),
        }
    }

    /// Normalize a value into this kind.
    ///
    /// Unparseable and missing values pass through untouched so the commit
    /// step can recognize them.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (_, v @ (Value::Unparseable(_) | Value::Missing)) => v,
            (ValueKind::Math, Value::Math(expr)) => Value::Math(expr),
            (ValueKind::Math, Value::Text(text)) => self.parse(&text),
            (ValueKind::Math, other) => other.to_expr().map(Value::Math).unwrap_or(Value::Missing),
            (ValueKind::Number, Value::Text(text)) => self.parse(&text),
            (ValueKind::Number, other) => Value::Number(other.as_number().unwrap_or(f64::NAN)),
            (ValueKind::Text, Value::Text(text)) => Value::Text(text),
            (ValueKind::Text, other) => Value::Text(other.to_string()),
            (ValueKind::Boolean, Value::Text(text)) => self.parse(&text),
            (ValueKind::Boolean, other) => Value::Bool(other.as_bool()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
