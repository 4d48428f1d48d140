//! Reports accumulated while evaluating an event

use serde::{Deserialize, Serialize};

/// Report created for one participant as a side effect of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub key: String,

    pub participant_id: String,

    /// Response that triggered the report, for submissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,

    /// Unix seconds, truncated to the minute
    pub timestamp: i64,

    #[serde(default)]
    pub data: Vec<ReportData>,
}

/// One attribute of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
}

impl Report {
    /// Create an empty report; the timestamp is truncated to the minute
    pub fn new(key: impl Into<String>, participant_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            participant_id: participant_id.into(),
            response_id: None,
            timestamp: timestamp - timestamp.rem_euclid(60),
            data: Vec::new(),
        }
    }

    /// Insert an attribute or replace the value of an existing one
    pub fn upsert(&mut self, entry: ReportData) {
        match self.data.iter_mut().find(|d| d.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.data.push(entry),
        }
    }

    /// Remove an attribute; no-op when absent
    pub fn remove(&mut self, key: &str) {
        self.data.retain(|d| d.key != key);
    }
}
