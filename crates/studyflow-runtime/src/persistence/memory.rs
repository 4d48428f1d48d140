//! In-memory persistence backend
//!
//! Simple memory-based study storage for tests, the rule simulator and
//! development. Data is lost when the process exits.

use super::{ResponseQuery, SortOrder, StudyDbService};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use studyflow_core::{StudyMessage, StudyVariable, SurveyResponse};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StudyData {
    responses: Vec<SurveyResponse>,
    confidential_responses: Vec<SurveyResponse>,
    researcher_messages: Vec<StudyMessage>,
    code_lists: HashMap<String, VecDeque<String>>,
    counters: HashMap<String, i64>,
    variables: HashMap<String, StudyVariable>,
}

type StudyId = (String, String);

fn study_id(instance_id: &str, study_key: &str) -> StudyId {
    (instance_id.to_string(), study_key.to_string())
}

/// In-memory study storage
///
/// All mutations happen under one write lock, so counter increments and code
/// draws are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStudyDb {
    studies: RwLock<HashMap<StudyId, StudyData>>,
}

impl InMemoryStudyDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a survey response
    pub async fn add_response(&self, instance_id: &str, study_key: &str, response: SurveyResponse) {
        let mut studies = self.studies.write().await;
        studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .responses
            .push(response);
    }

    /// Store a confidential response; `participant_id` holds the confidential id
    pub async fn add_confidential_response(
        &self,
        instance_id: &str,
        study_key: &str,
        response: SurveyResponse,
    ) {
        let mut studies = self.studies.write().await;
        studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .confidential_responses
            .push(response);
    }

    /// Append codes to a study code list
    pub async fn add_study_codes<I, S>(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
        codes: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut studies = self.studies.write().await;
        studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .code_lists
            .entry(list_key.to_string())
            .or_default()
            .extend(codes.into_iter().map(Into::<String>::into));
    }

    pub async fn set_study_variable(
        &self,
        instance_id: &str,
        study_key: &str,
        variable: StudyVariable,
    ) {
        let mut studies = self.studies.write().await;
        studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .variables
            .insert(variable.key.clone(), variable);
    }

    pub async fn set_counter(&self, instance_id: &str, study_key: &str, scope: &str, value: i64) {
        let mut studies = self.studies.write().await;
        studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .counters
            .insert(scope.to_string(), value);
    }

    /// Researcher messages saved so far
    pub async fn researcher_messages(
        &self,
        instance_id: &str,
        study_key: &str,
    ) -> Vec<StudyMessage> {
        let studies = self.studies.read().await;
        studies
            .get(&study_id(instance_id, study_key))
            .map(|s| s.researcher_messages.clone())
            .unwrap_or_default()
    }

    /// Confidential responses still stored
    pub async fn confidential_responses(
        &self,
        instance_id: &str,
        study_key: &str,
    ) -> Vec<SurveyResponse> {
        let studies = self.studies.read().await;
        studies
            .get(&study_id(instance_id, study_key))
            .map(|s| s.confidential_responses.clone())
            .unwrap_or_default()
    }

    /// Remaining codes of a list, in draw order
    pub async fn study_codes(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
    ) -> Vec<String> {
        let studies = self.studies.read().await;
        studies
            .get(&study_id(instance_id, study_key))
            .and_then(|s| s.code_lists.get(list_key))
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StudyDbService for InMemoryStudyDb {
    async fn get_responses(
        &self,
        instance_id: &str,
        study_key: &str,
        query: &ResponseQuery,
    ) -> Result<Vec<SurveyResponse>> {
        let studies = self.studies.read().await;
        let Some(study) = studies.get(&study_id(instance_id, study_key)) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<SurveyResponse> = study
            .responses
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        match query.sort {
            SortOrder::Descending => results.sort_by(|a, b| b.arrived_at.cmp(&a.arrived_at)),
            SortOrder::Ascending => results.sort_by(|a, b| a.arrived_at.cmp(&b.arrived_at)),
        }

        let skip = query.page.saturating_sub(1) * query.limit;
        Ok(results.into_iter().skip(skip).take(query.limit).collect())
    }

    async fn delete_confidential_responses(
        &self,
        instance_id: &str,
        study_key: &str,
        participant_id: &str,
        key: Option<&str>,
    ) -> Result<u64> {
        let mut studies = self.studies.write().await;
        let Some(study) = studies.get_mut(&study_id(instance_id, study_key)) else {
            return Ok(0);
        };

        let before = study.confidential_responses.len();
        study.confidential_responses.retain(|r| {
            let matches_key = key.map_or(true, |k| r.key == k);
            !(r.participant_id == participant_id && matches_key)
        });
        Ok((before - study.confidential_responses.len()) as u64)
    }

    async fn save_researcher_message(
        &self,
        instance_id: &str,
        study_key: &str,
        message: StudyMessage,
    ) -> Result<()> {
        let mut studies = self.studies.write().await;
        studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .researcher_messages
            .push(message);
        Ok(())
    }

    async fn study_code_list_entry_exists(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
        code: &str,
    ) -> Result<bool> {
        let studies = self.studies.read().await;
        Ok(studies
            .get(&study_id(instance_id, study_key))
            .and_then(|s| s.code_lists.get(list_key))
            .map_or(false, |codes| codes.iter().any(|c| c == code)))
    }

    async fn delete_study_code_list_entry(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
        code: &str,
    ) -> Result<()> {
        let mut studies = self.studies.write().await;
        if let Some(codes) = studies
            .get_mut(&study_id(instance_id, study_key))
            .and_then(|s| s.code_lists.get_mut(list_key))
        {
            codes.retain(|c| c != code);
        }
        Ok(())
    }

    async fn draw_study_code(
        &self,
        instance_id: &str,
        study_key: &str,
        list_key: &str,
    ) -> Result<Option<String>> {
        let mut studies = self.studies.write().await;
        Ok(studies
            .get_mut(&study_id(instance_id, study_key))
            .and_then(|s| s.code_lists.get_mut(list_key))
            .and_then(|codes| codes.pop_front()))
    }

    async fn get_current_study_counter_value(
        &self,
        instance_id: &str,
        study_key: &str,
        scope: &str,
    ) -> Result<i64> {
        let studies = self.studies.read().await;
        Ok(studies
            .get(&study_id(instance_id, study_key))
            .and_then(|s| s.counters.get(scope))
            .copied()
            .unwrap_or(0))
    }

    async fn increment_and_get_study_counter_value(
        &self,
        instance_id: &str,
        study_key: &str,
        scope: &str,
    ) -> Result<i64> {
        let mut studies = self.studies.write().await;
        let counter = studies
            .entry(study_id(instance_id, study_key))
            .or_default()
            .counters
            .entry(scope.to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn get_study_variable(
        &self,
        instance_id: &str,
        study_key: &str,
        key: &str,
    ) -> Result<Option<StudyVariable>> {
        let studies = self.studies.read().await;
        Ok(studies
            .get(&study_id(instance_id, study_key))
            .and_then(|s| s.variables.get(key))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn response(key: &str, arrived_at: i64) -> SurveyResponse {
        SurveyResponse {
            key: key.to_string(),
            participant_id: "p1".to_string(),
            arrived_at,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_responses_newest_first_with_paging() {
        let db = InMemoryStudyDb::new();
        for ts in [10, 30, 20, 40] {
            db.add_response("inst", "study", response("weekly", ts)).await;
        }

        let mut query = ResponseQuery::for_participant("p1");
        query.limit = 3;
        let page1 = db.get_responses("inst", "study", &query).await.unwrap();
        let arrived: Vec<i64> = page1.iter().map(|r| r.arrived_at).collect();
        assert_eq!(arrived, vec![40, 30, 20]);

        query.page = 2;
        let page2 = db.get_responses("inst", "study", &query).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].arrived_at, 10);
    }

    #[tokio::test]
    async fn test_get_responses_unknown_study_is_empty() {
        let db = InMemoryStudyDb::new();
        let query = ResponseQuery::for_participant("p1");
        assert!(db.get_responses("x", "y", &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draw_study_code_pops_in_order() {
        let db = InMemoryStudyDb::new();
        db.add_study_codes("inst", "study", "codes", ["A", "B"]).await;

        assert_eq!(
            db.draw_study_code("inst", "study", "codes").await.unwrap(),
            Some("A".to_string())
        );
        assert!(!db
            .study_code_list_entry_exists("inst", "study", "codes", "A")
            .await
            .unwrap());
        assert_eq!(
            db.draw_study_code("inst", "study", "codes").await.unwrap(),
            Some("B".to_string())
        );
        assert_eq!(db.draw_study_code("inst", "study", "codes").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counter_increments_are_atomic() {
        let db = Arc::new(InMemoryStudyDb::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.increment_and_get_study_counter_value("inst", "study", "ids")
                    .await
                    .unwrap()
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=50).collect::<Vec<i64>>());
        assert_eq!(
            db.get_current_study_counter_value("inst", "study", "ids")
                .await
                .unwrap(),
            50
        );
    }

    #[tokio::test]
    async fn test_delete_confidential_responses_by_key_and_all() {
        let db = InMemoryStudyDb::new();
        for key in ["consent", "contact", "consent"] {
            let mut r = response(key, 1);
            r.participant_id = "conf-1".to_string();
            db.add_confidential_response("inst", "study", r).await;
        }
        let mut other = response("consent", 1);
        other.participant_id = "conf-2".to_string();
        db.add_confidential_response("inst", "study", other).await;

        let deleted = db
            .delete_confidential_responses("inst", "study", "conf-1", Some("consent"))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let deleted = db
            .delete_confidential_responses("inst", "study", "conf-1", None)
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = db.confidential_responses("inst", "study").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].participant_id, "conf-2");
    }
}
