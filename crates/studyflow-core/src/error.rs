//! Error types for studyflow core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unsupported study variable type: {0}")]
    UnsupportedVariableType(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
