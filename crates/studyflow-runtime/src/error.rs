//! Runtime error types

use studyflow_core::CoreError;
use thiserror::Error;

/// Runtime error
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Expression name not present in the registry
    #[error("Unknown expression: {0}")]
    UnknownExpression(String),

    /// Action name not present in the registry
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Wrong argument count or argument kind
    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    /// Argument or operand of the wrong value type
    #[error("Type error in {name}: {reason}")]
    TypeMismatch { name: String, reason: String },

    /// Referenced item, slot or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// `incomingState:` expression used on an event without a merge participant
    #[error("{0} reads the incoming participant state, but the event carries none")]
    MissingIncomingState(String),

    /// Persistence port failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// External service gateway failure
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Rule tree nested deeper than the configured limit
    #[error("Rule nesting exceeds maximum depth of {0}")]
    DepthLimitExceeded(usize),

    /// A rule of a rule set failed under the abort policy
    #[error("Rule {index} failed: {source}")]
    RuleFailed {
        index: usize,
        #[source]
        source: Box<RuntimeError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by core types
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RuntimeError {
    pub(crate) fn invalid_args(name: &str, reason: impl Into<String>) -> Self {
        RuntimeError::InvalidArguments {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(name: &str, reason: impl ToString) -> Self {
        RuntimeError::TypeMismatch {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_args_message() {
        let err = RuntimeError::invalid_args("UPDATE_FLAG", "expected 2 arguments, got 1");
        assert_eq!(
            err.to_string(),
            "Invalid arguments for UPDATE_FLAG: expected 2 arguments, got 1"
        );
    }

    #[test]
    fn test_rule_failed_keeps_source() {
        let err = RuntimeError::RuleFailed {
            index: 2,
            source: Box::new(RuntimeError::UnknownAction("NOPE".to_string())),
        };
        assert!(err.to_string().contains("Rule 2 failed"));
        assert!(err.to_string().contains("NOPE"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
