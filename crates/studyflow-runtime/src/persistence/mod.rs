//! Persistence port
//!
//! The only way the engine touches storage. Implementations own their
//! connection pooling and must tolerate concurrent calls from many in-flight
//! evaluations; counter increments and code draws must be atomic at the
//! storage layer.

mod memory;

pub use memory::InMemoryStudyDb;

use crate::error::Result;
use async_trait::async_trait;
use studyflow_core::{StudyMessage, StudyVariable, SurveyResponse};

/// Upper bound of historical responses fetched for one condition check
pub const MAX_HISTORY_RESPONSES: usize = 100;

/// Sort order of response queries, by arrival time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Newest first
    #[default]
    Descending,
    /// Oldest first
    Ascending,
}

/// Filter, sort and paging for response history queries
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseQuery {
    pub participant_id: String,

    pub survey_key: Option<String>,

    /// Inclusive lower bound on `arrived_at`
    pub since: Option<i64>,

    /// Exclusive upper bound on `arrived_at`
    pub until: Option<i64>,

    pub sort: SortOrder,

    /// 1-based page
    pub page: usize,

    pub limit: usize,
}

impl ResponseQuery {
    /// Newest-first query over all responses of a participant
    pub fn for_participant(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            survey_key: None,
            since: None,
            until: None,
            sort: SortOrder::Descending,
            page: 1,
            limit: MAX_HISTORY_RESPONSES,
        }
    }

    /// Builder method to restrict the survey key
    pub fn with_survey_key(mut self, survey_key: impl Into<String>) -> Self {
        self.survey_key = Some(survey_key.into());
        self
    }

    /// Builder method to restrict the arrival window
    pub fn with_window(mut self, since: Option<i64>, until: Option<i64>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Check if a response matches the filter part of this query
    pub fn matches(&self, response: &SurveyResponse) -> bool {
        if response.participant_id != self.participant_id {
            return false;
        }

        if let Some(ref key) = self.survey_key {
            if &response.key != key {
                return false;
            }
        }

        if let Some(since) = self.since {
            if response.arrived_at < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if response.arrived_at >= until {
                return false;
            }
        }

        true
    }
}

/// Storage capability consumed by the engine
#[async_trait]
pub trait StudyDbService: Send + Sync {
    /// Query stored survey responses
    async fn get_responses(
        &self,
        instance_id: &str,
        study_key: &str,
        query: &ResponseQuery,
    ) -> Result<Vec<SurveyResponse>>;

    /// Delete confidential responses of a participant; `key: None` deletes all.
    /// Returns the number of deleted responses.
    async fn delete_confidential_responses(
        &self,
        instance_id: &str,
        study_key: &str,
        participant_id: &str,
        key: Option<&str>,
    ) -> Result<u64>;

    /// Persist a message for study researchers
    async fn save_researcher_message(
        &self,
        instance_id: &str,
        study_key: &str,
        message: StudyMessage,
    ) -> Result<()>;

    async fn study_code_list_entry_exists(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
        code: &str,
    ) -> Result<bool>;

    async fn delete_study_code_list_entry(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
        code: &str,
    ) -> Result<()>;

    /// Remove and return one code of a list; `None` when the list is empty
    async fn draw_study_code(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
    ) -> Result<Option<String>>;

    async fn get_current_study_counter_value(
        &self,
        instance_id: &str,
        study_key: &str,
        scope: &str,
    ) -> Result<i64>;

    /// Atomically increment a counter and return the new value
    async fn increment_and_get_study_counter_value(
        &self,
        instance_id: &str,
        study_key: &str,
        scope: &str,
    ) -> Result<i64>;

    async fn get_study_variable(
        &self,
        instance_id: &str,
        study_key: &str,
        key: &str,
    ) -> Result<Option<StudyVariable>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(participant: &str, key: &str, arrived_at: i64) -> SurveyResponse {
        SurveyResponse {
            key: key.to_string(),
            participant_id: participant.to_string(),
            arrived_at,
            ..Default::default()
        }
    }

    #[test]
    fn test_query_filter() {
        let query = ResponseQuery::for_participant("p1")
            .with_survey_key("weekly")
            .with_window(Some(100), Some(200));

        assert!(query.matches(&response("p1", "weekly", 100)));
        assert!(query.matches(&response("p1", "weekly", 199)));
        assert!(!query.matches(&response("p1", "weekly", 200)));
        assert!(!query.matches(&response("p1", "weekly", 99)));
        assert!(!query.matches(&response("p1", "intake", 150)));
        assert!(!query.matches(&response("p2", "weekly", 150)));
    }

    #[test]
    fn test_query_defaults() {
        let query = ResponseQuery::for_participant("p1");
        assert_eq!(query.sort, SortOrder::Descending);
        assert_eq!(query.limit, MAX_HISTORY_RESPONSES);
        assert!(query.matches(&response("p1", "anything", 0)));
    }
}
