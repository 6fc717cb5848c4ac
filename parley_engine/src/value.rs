//! Runtime values produced by expressions and stored in variables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed runtime value.
///
/// Enum tags keep their canonical `Enum.Case` spelling; a bare `.Case`
/// shorthand is stored with an empty enum name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, variantly::Variantly)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    #[serde(skip)]
    Enum { name: String, case: String },
}

impl Value {
    pub fn enum_tag(name: impl Into<String>, case: impl Into<String>) -> Self {
        Value::Enum {
            name: name.into(),
            case: case.into(),
        }
    }

    /// `false`, `0`, NaN and `""` are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Enum { .. } => true,
        }
    }

    /// Numeric view used by arithmetic. Booleans count as 1/0 and numeric
    /// strings are parsed; anything else has no numeric value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Enum { .. } => None,
        }
    }

    /// Lossy numeric view for ordering comparisons (NaN when not numeric).
    pub fn to_f64_lossy(&self) -> f64 {
        self.as_number().unwrap_or(f64::NAN)
    }

    /// Loose equality: numbers compare numerically, enum tags compare by
    /// canonical spelling (a bare `.Case` matches any enum with that case).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Enum { name: a, case: ca }, Value::Enum { name: b, case: cb }) => {
                ca == cb && (a.is_empty() || b.is_empty() || a == b)
            },
            (Value::Enum { name, case }, Value::Text(s)) | (Value::Text(s), Value::Enum { name, case }) => {
                match s.split_once('.') {
                    Some((n, c)) => c == case && (n.is_empty() || n == name),
                    None => false,
                }
            },
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Number(_), Value::Bool(_) | Value::Text(_)) | (Value::Bool(_) | Value::Text(_), Value::Number(_)) => {
                match (self.as_number(), other.as_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            },
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Enum { .. } => "enum",
        }
    }
}

/// Integral numbers print without a trailing `.0`; non-finite numbers print
/// as Rust does (`NaN`, `inf`).
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::Enum { name, case } => write!(f, "{name}.{case}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::from(0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(Value::enum_tag("Mood", "Calm").truthy());
    }

    #[test]
    fn numbers_display_without_trailing_zero() {
        assert_eq!(Value::from(10.0).to_string(), "10");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-3).to_string(), "-3");
    }

    #[test]
    fn enum_equality_rules() {
        let calm = Value::enum_tag("Mood", "Calm");
        assert!(calm.loose_eq(&Value::enum_tag("", "Calm")));
        assert!(calm.loose_eq(&Value::from("Mood.Calm")));
        assert!(calm.loose_eq(&Value::from(".Calm")));
        assert!(!calm.loose_eq(&Value::enum_tag("Weather", "Calm")));
        assert!(!calm.loose_eq(&Value::enum_tag("Mood", "Angry")));
    }

    #[test]
    fn mixed_numeric_equality() {
        assert!(Value::from(1).loose_eq(&Value::from(true)));
        assert!(Value::from(10).loose_eq(&Value::from("10")));
        assert!(!Value::from(10).loose_eq(&Value::from("ten")));
    }
}
