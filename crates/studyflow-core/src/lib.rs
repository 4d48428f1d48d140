//! studyflow core - shared types for the study rule engine
//!
//! This crate provides the data the engine works on:
//! - The rule DSL syntax tree (`Expression`, `ExpressionArg`)
//! - Evaluated values (`ExprValue`)
//! - Participant state, study events, reports and study-level records
//! - Error types

pub mod ast;
pub mod error;
pub mod study;
pub mod types;

// Re-export commonly used types
pub use ast::{Expression, ExpressionArg};
pub use error::CoreError;
pub use study::{
    study_status, AssignedSurvey, Participant, ParticipantMessage, Report, ReportData,
    ResponseItem, StudyEvent, StudyEventType, StudyMessage, StudyVariable, StudyVariableType,
    SurveyItemResponse, SurveyResponse,
};
pub use types::ExprValue;
