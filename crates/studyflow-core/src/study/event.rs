//! Study events and submitted survey responses

use super::participant::Participant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of event the rule set is evaluated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudyEventType {
    /// Participant joins the study
    Enter,
    /// Survey response submitted
    Submit,
    /// Periodic timer tick
    Timer,
    /// Custom event identified by `event_key`
    Custom,
    /// Two participant records are merged
    Merge,
    /// Participant leaves the study
    Leave,
}

impl StudyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyEventType::Enter => "ENTER",
            StudyEventType::Submit => "SUBMIT",
            StudyEventType::Timer => "TIMER",
            StudyEventType::Custom => "CUSTOM",
            StudyEventType::Merge => "MERGE",
            StudyEventType::Leave => "LEAVE",
        }
    }
}

impl fmt::Display for StudyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event supplied by the caller for one rule evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyEvent {
    #[serde(rename = "instanceID")]
    pub instance_id: String,

    pub study_key: String,

    #[serde(rename = "type")]
    pub event_type: StudyEventType,

    /// Submitted response, for `SUBMIT` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<SurveyResponse>,

    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,

    /// Key of a `CUSTOM` event
    #[serde(default)]
    pub event_key: String,

    /// Incoming state during a merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_with_participant: Option<Participant>,

    /// Confidential participant id, when it differs from the participant's own id
    #[serde(
        rename = "participantIDForConfidentialResponses",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub participant_id_for_confidential_responses: Option<String>,
}

impl StudyEvent {
    /// Create an event of the given type with no response or payload
    pub fn new(
        instance_id: impl Into<String>,
        study_key: impl Into<String>,
        event_type: StudyEventType,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            study_key: study_key.into(),
            event_type,
            response: None,
            payload: HashMap::new(),
            event_key: String::new(),
            merge_with_participant: None,
            participant_id_for_confidential_responses: None,
        }
    }

    /// Builder method to attach a submitted response
    pub fn with_response(mut self, response: SurveyResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Builder method to set the custom event key
    pub fn with_event_key(mut self, key: impl Into<String>) -> Self {
        self.event_key = key.into();
        self
    }

    /// Builder method to add a payload entry
    pub fn with_payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Builder method to set the incoming participant of a merge
    pub fn with_merge_participant(mut self, participant: Participant) -> Self {
        self.merge_with_participant = Some(participant);
        self
    }
}

/// A submitted survey
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    #[serde(default)]
    pub id: String,

    pub key: String,

    #[serde(default)]
    pub participant_id: String,

    #[serde(default)]
    pub version_id: String,

    #[serde(default)]
    pub opened_at: i64,

    #[serde(default)]
    pub submitted_at: i64,

    /// Unix seconds the response reached the backend; 0 when unknown
    #[serde(default)]
    pub arrived_at: i64,

    #[serde(default)]
    pub responses: Vec<SurveyItemResponse>,

    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl SurveyResponse {
    /// Find the response to a survey item by item key
    pub fn item(&self, item_key: &str) -> Option<&SurveyItemResponse> {
        self.responses.iter().find(|r| r.key == item_key)
    }
}

/// Response to a single survey item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyItemResponse {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidential_mode: Option<String>,
}

impl SurveyItemResponse {
    /// Locate a nested response object by dot-separated path.
    ///
    /// The first segment must match the root response key, each further
    /// segment selects a child by key: `rg.scg.1` is child `1` of child `scg`
    /// of root `rg`.
    pub fn find(&self, path: &str) -> Option<&ResponseItem> {
        let mut segments = path.split('.');
        let root = self.response.as_ref()?;
        if segments.next()? != root.key {
            return None;
        }
        segments.try_fold(root, |current, segment| {
            current.items.iter().find(|child| child.key == segment)
        })
    }
}

/// Node of a response tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dtype: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ResponseItem>,
}

impl ResponseItem {
    /// Leaf node with a value
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Group node with children
    pub fn group(key: impl Into<String>, items: Vec<ResponseItem>) -> Self {
        Self {
            key: key.into(),
            items,
            ..Default::default()
        }
    }
}
