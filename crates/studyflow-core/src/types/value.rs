//! Evaluated expression values
//!
//! Every expression in the rule DSL evaluates to one of three shapes: a number,
//! a string or a boolean. `ExprValue` makes that explicit so handlers match on
//! the shape instead of guessing at runtime.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprValue {
    /// Boolean value
    Bool(bool),
    /// Number value (timestamps, counters and numeric answers share f64)
    Num(f64),
    /// String value
    Str(String),
}

impl ExprValue {
    /// Name of the variant, used in type error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ExprValue::Bool(_) => "boolean",
            ExprValue::Num(_) => "number",
            ExprValue::Str(_) => "string",
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            ExprValue::Num(n) => Ok(*n),
            other => Err(CoreError::TypeError {
                expected: "number",
                actual: other.type_name(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            ExprValue::Str(s) => Ok(s),
            other => Err(CoreError::TypeError {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            ExprValue::Bool(b) => Ok(*b),
            other => Err(CoreError::TypeError {
                expected: "boolean",
                actual: other.type_name(),
            }),
        }
    }

    /// Truthiness used by `and`/`or`/`not` and by `IF` conditions.
    ///
    /// Booleans are taken as is, numbers are true when non-zero. Strings have
    /// no truth value and yield `None`.
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            ExprValue::Bool(b) => Some(*b),
            ExprValue::Num(n) => Some(*n != 0.0),
            ExprValue::Str(_) => None,
        }
    }

    /// Convert an arbitrary JSON value into an expression value.
    ///
    /// Only scalars are accepted; `null`, arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Bool(b) => Ok(ExprValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(ExprValue::Num)
                .ok_or_else(|| CoreError::InvalidValue(format!("number out of range: {}", n))),
            serde_json::Value::String(s) => Ok(ExprValue::Str(s.clone())),
            other => Err(CoreError::InvalidValue(format!(
                "expected a scalar JSON value, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Bool(b) => write!(f, "{}", b),
            ExprValue::Num(n) => write!(f, "{}", n),
            ExprValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ExprValue {
    fn from(value: bool) -> Self {
        ExprValue::Bool(value)
    }
}

impl From<f64> for ExprValue {
    fn from(value: f64) -> Self {
        ExprValue::Num(value)
    }
}

impl From<i64> for ExprValue {
    fn from(value: i64) -> Self {
        ExprValue::Num(value as f64)
    }
}

impl From<String> for ExprValue {
    fn from(value: String) -> Self {
        ExprValue::Str(value)
    }
}

impl From<&str> for ExprValue {
    fn from(value: &str) -> Self {
        ExprValue::Str(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_match_variant() {
        assert_eq!(ExprValue::Num(2.5).as_f64().unwrap(), 2.5);
        assert_eq!(ExprValue::from("abc").as_str().unwrap(), "abc");
        assert!(ExprValue::Bool(true).as_bool().unwrap());
    }

    #[test]
    fn test_accessor_type_error_names_both_types() {
        let err = ExprValue::from("abc").as_f64().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("number"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(ExprValue::Num(0.0).truthiness(), Some(false));
        assert_eq!(ExprValue::Num(-3.0).truthiness(), Some(true));
        assert_eq!(ExprValue::Bool(false).truthiness(), Some(false));
        assert_eq!(ExprValue::from("").truthiness(), None);
    }

    #[test]
    fn test_from_json_scalars_only() {
        assert_eq!(
            ExprValue::from_json(&serde_json::json!(3)).unwrap(),
            ExprValue::Num(3.0)
        );
        assert_eq!(
            ExprValue::from_json(&serde_json::json!("x")).unwrap(),
            ExprValue::from("x")
        );
        assert!(ExprValue::from_json(&serde_json::json!(null)).is_err());
        assert!(ExprValue::from_json(&serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn test_untagged_serde() {
        let json = serde_json::to_string(&ExprValue::Num(4.0)).unwrap();
        assert_eq!(json, "4.0");
        let back: ExprValue = serde_json::from_str("true").unwrap();
        assert_eq!(back, ExprValue::Bool(true));
    }
}
