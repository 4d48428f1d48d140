//! Study-level records read and written through the persistence port

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Message for study researchers, produced by `NOTIFY_RESEARCHER`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyMessage {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub message_type: String,

    pub participant_id: String,

    #[serde(default)]
    pub payload: HashMap<String, String>,
}

/// Declared type of a study variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyVariableType {
    Boolean,
    Int,
    Float,
    String,
    Date,
}

impl StudyVariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyVariableType::Boolean => "boolean",
            StudyVariableType::Int => "int",
            StudyVariableType::Float => "float",
            StudyVariableType::String => "string",
            StudyVariableType::Date => "date",
        }
    }
}

impl fmt::Display for StudyVariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyVariableType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(StudyVariableType::Boolean),
            "int" => Ok(StudyVariableType::Int),
            "float" => Ok(StudyVariableType::Float),
            "string" => Ok(StudyVariableType::String),
            "date" => Ok(StudyVariableType::Date),
            other => Err(CoreError::UnsupportedVariableType(other.to_string())),
        }
    }
}

/// Typed, study-scoped configuration value
///
/// `value` holds a JSON boolean, number or string. Dates are stored either as
/// unix seconds or as an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyVariable {
    pub key: String,

    #[serde(rename = "type")]
    pub value_type: StudyVariableType,

    pub value: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
