//! Per-participant study state

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known participant study statuses
pub mod study_status {
    pub const ACTIVE: &str = "active";
    pub const TEMPORARY: &str = "temporary";
    pub const VIRTUAL: &str = "virtual";
    pub const EXITED: &str = "exited";
    pub const ACCOUNT_DELETED: &str = "accountDeleted";
}

fn default_study_status() -> String {
    study_status::ACTIVE.to_string()
}

/// Durable state of one participant in one study
///
/// The engine never mutates a participant in place: actions clone the state
/// they receive and return the modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: String,

    #[serde(default)]
    pub current_study_session: String,

    /// Unix seconds of study entry
    #[serde(default)]
    pub entered_at: i64,

    #[serde(default = "default_study_status")]
    pub study_status: String,

    #[serde(default)]
    pub flags: HashMap<String, String>,

    #[serde(default)]
    pub linking_codes: HashMap<String, String>,

    /// Ordered; the same survey key may appear more than once
    #[serde(default)]
    pub assigned_surveys: Vec<AssignedSurvey>,

    /// Survey key to unix seconds of the latest submission
    #[serde(default)]
    pub last_submissions: HashMap<String, i64>,

    #[serde(default)]
    pub messages: Vec<ParticipantMessage>,
}

impl Participant {
    /// Create an active participant with empty state
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            current_study_session: String::new(),
            entered_at: 0,
            study_status: default_study_status(),
            flags: HashMap::new(),
            linking_codes: HashMap::new(),
            assigned_surveys: Vec::new(),
            last_submissions: HashMap::new(),
            messages: Vec::new(),
        }
    }

    /// Builder method to set a flag
    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(key.into(), value.into());
        self
    }

    /// Builder method to set the study status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.study_status = status.into();
        self
    }
}

/// Survey currently assigned to a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedSurvey {
    pub survey_key: String,

    #[serde(default)]
    pub study_key: String,

    /// Unix seconds; 0 means no lower bound
    #[serde(default)]
    pub valid_from: i64,

    /// Unix seconds; 0 means no upper bound
    #[serde(default)]
    pub valid_until: i64,

    /// e.g. `prio`, `normal`, `optional`
    #[serde(default)]
    pub category: String,

    /// Profile the survey is addressed to, when not the main profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

/// Message scheduled for later delivery to the participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMessage {
    pub id: String,

    #[serde(rename = "type")]
    pub message_type: String,

    /// Unix seconds
    pub scheduled_for: i64,
}
