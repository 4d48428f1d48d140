//! Expression nodes and their arguments

use serde::{Deserialize, Serialize};

/// Named node of the rule DSL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    /// Expression or action name, e.g. `checkEventType` or `UPDATE_FLAG`
    pub name: String,

    /// Optional declared return type (`"float"` coerces external results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,

    /// Ordered arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<ExpressionArg>,
}

/// A single expression argument
///
/// Stored as `{dtype, num?, str?, exp?}`. A missing or unrecognised `dtype`
/// is read as a string argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawExpressionArg", into = "RawExpressionArg")]
pub enum ExpressionArg {
    /// Literal number
    Num(f64),
    /// Literal string
    Str(String),
    /// Nested expression; `None` when the stored node is missing
    Exp(Option<Box<Expression>>),
}

impl ExpressionArg {
    /// Stored `dtype` tag of this argument
    pub fn dtype(&self) -> &'static str {
        match self {
            ExpressionArg::Num(_) => "num",
            ExpressionArg::Str(_) => "str",
            ExpressionArg::Exp(_) => "exp",
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, ExpressionArg::Exp(_))
    }

    /// Nested expression, if this argument carries one
    pub fn expression(&self) -> Option<&Expression> {
        match self {
            ExpressionArg::Exp(Some(exp)) => Some(exp),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawExpressionArg {
    #[serde(default)]
    dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<Box<Expression>>,
}

impl From<RawExpressionArg> for ExpressionArg {
    fn from(raw: RawExpressionArg) -> Self {
        match raw.dtype.as_deref() {
            Some("num") => ExpressionArg::Num(raw.num.unwrap_or_default()),
            Some("exp") => ExpressionArg::Exp(raw.exp),
            _ => ExpressionArg::Str(raw.str.unwrap_or_default()),
        }
    }
}

impl From<ExpressionArg> for RawExpressionArg {
    fn from(arg: ExpressionArg) -> Self {
        let dtype = Some(arg.dtype().to_string());
        match arg {
            ExpressionArg::Num(num) => RawExpressionArg {
                dtype,
                num: Some(num),
                str: None,
                exp: None,
            },
            ExpressionArg::Str(s) => RawExpressionArg {
                dtype,
                num: None,
                str: Some(s),
                exp: None,
            },
            ExpressionArg::Exp(exp) => RawExpressionArg {
                dtype,
                num: None,
                str: None,
                exp,
            },
        }
    }
}

impl Expression {
    /// Create an expression with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: None,
            data: Vec::new(),
        }
    }

    /// Builder method to append a number argument
    pub fn num(mut self, value: f64) -> Self {
        self.data.push(ExpressionArg::Num(value));
        self
    }

    /// Builder method to append a string argument
    pub fn str(mut self, value: impl Into<String>) -> Self {
        self.data.push(ExpressionArg::Str(value.into()));
        self
    }

    /// Builder method to append a nested expression argument
    pub fn exp(mut self, value: Expression) -> Self {
        self.data.push(ExpressionArg::Exp(Some(Box::new(value))));
        self
    }

    /// Builder method to set the declared return type
    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }
}
