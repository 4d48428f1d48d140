//! Action executor
//!
//! Actions are state transitions: each takes the previous [`ActionData`] by
//! reference and returns a new one, leaving the input untouched. Control-flow
//! actions (`IF`, `DO`, `IFTHEN`) evaluate nested actions one level deeper and
//! share the engine's depth limit with expression evaluation.

mod control;
mod external;
mod report;
mod state;
mod study_data;

use crate::context::ActionData;
use crate::engine::registry::{lookup_action, ActionKind};
use crate::engine::StudyEngine;
use crate::error::{Result, RuntimeError};
use crate::expression::{Args, BoxedEval};
use studyflow_core::{Expression, StudyEvent, StudyEventType};
use tracing::debug;

impl StudyEngine {
    /// Evaluate an action tree for an event
    ///
    /// For a `SUBMIT` event the arrival time of the submitted response is
    /// recorded in `lastSubmissions` first, once for the whole tree. Errors are
    /// logged at debug level and returned; `old_state` is never modified.
    pub async fn eval_action(
        &self,
        action: &Expression,
        old_state: &ActionData,
        event: &StudyEvent,
    ) -> Result<ActionData> {
        let state = self.record_last_submission(old_state, event);
        let result = self.dispatch_action(action, &state, event, 0).await;
        if let Err(e) = &result {
            debug!(
                action = %action.name,
                event_type = %event.event_type,
                error = %e,
                "action evaluation failed"
            );
        }
        result
    }

    pub(crate) fn record_last_submission(
        &self,
        state: &ActionData,
        event: &StudyEvent,
    ) -> ActionData {
        let mut next = state.clone();
        if event.event_type != StudyEventType::Submit {
            return next;
        }
        if let Some(response) = &event.response {
            let arrived_at = if response.arrived_at == 0 {
                self.now()
            } else {
                response.arrived_at
            };
            next.participant_state
                .last_submissions
                .insert(response.key.clone(), arrived_at);
        }
        next
    }

    pub(crate) fn dispatch_action<'a>(
        &'a self,
        action: &'a Expression,
        state: &'a ActionData,
        event: &'a StudyEvent,
        depth: usize,
    ) -> BoxedEval<'a, ActionData> {
        Box::pin(async move {
            let kind = lookup_action(&action.name)
                .ok_or_else(|| RuntimeError::UnknownAction(action.name.clone()))?;
            let args = Args::new(self, action, state.eval_context(event).at_depth(depth));

            match kind {
                ActionKind::If => control::if_action(&args, state).await,
                ActionKind::Do => control::do_action(&args, state).await,
                ActionKind::IfThen => control::if_then(&args, state).await,

                ActionKind::UpdateStudyStatus => state::update_study_status(&args, state).await,
                ActionKind::StartNewStudySession => state::start_new_study_session(&args, state),
                ActionKind::UpdateFlag => state::update_flag(&args, state).await,
                ActionKind::RemoveFlag => state::remove_flag(&args, state).await,
                ActionKind::SetLinkingCode => state::set_linking_code(&args, state).await,
                ActionKind::DeleteLinkingCode => state::delete_linking_code(&args, state).await,
                ActionKind::AddNewSurvey => state::add_new_survey(&args, state).await,
                ActionKind::RemoveAllSurveys => state::remove_all_surveys(&args, state),
                ActionKind::RemoveSurveyByKey => state::remove_survey_by_key(&args, state).await,
                ActionKind::RemoveSurveysByKey => state::remove_surveys_by_key(&args, state).await,
                ActionKind::AddMessage => state::add_message(&args, state).await,
                ActionKind::RemoveAllMessages => state::remove_all_messages(&args, state),
                ActionKind::RemoveMessagesByType => {
                    state::remove_messages_by_type(&args, state).await
                }

                ActionKind::InitReport => report::init_report(&args, state).await,
                ActionKind::UpdateReportData => report::update_report_data(&args, state).await,
                ActionKind::RemoveReportData => report::remove_report_data(&args, state).await,
                ActionKind::CancelReport => report::cancel_report(&args, state).await,

                ActionKind::NotifyResearcher => study_data::notify_researcher(&args, state).await,
                ActionKind::RemoveConfidentialResponseByKey => {
                    study_data::remove_confidential_response_by_key(&args, state).await
                }
                ActionKind::RemoveAllConfidentialResponses => {
                    study_data::remove_all_confidential_responses(&args, state).await
                }
                ActionKind::RemoveStudyCode => study_data::remove_study_code(&args, state).await,
                ActionKind::DrawStudyCodeAsLinkingCode => {
                    study_data::draw_study_code_as_linking_code(&args, state).await
                }

                ActionKind::ExternalEventHandler => {
                    external::external_event_handler(&args, state).await
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::persistence::InMemoryStudyDb;
    use std::sync::Arc;
    use studyflow_core::{Participant, SurveyResponse};

    fn engine(now: i64) -> StudyEngine {
        StudyEngine::builder(Arc::new(InMemoryStudyDb::new()))
            .with_clock(Arc::new(FixedClock::new(now)))
            .build()
            .unwrap()
    }

    fn submit(key: &str, arrived_at: i64) -> StudyEvent {
        StudyEvent::new("i", "s", StudyEventType::Submit).with_response(SurveyResponse {
            key: key.to_string(),
            arrived_at,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_submission_recorded_once_per_tree() {
        let engine = engine(500);
        let state = ActionData::new(Participant::new("p"));
        let action = Expression::new("DO")
            .exp(Expression::new("UPDATE_FLAG").str("a").str("1"))
            .exp(Expression::new("UPDATE_FLAG").str("b").str("2"));

        let next = engine.eval_action(&action, &state, &submit("weekly", 0)).await.unwrap();
        assert_eq!(next.participant_state.last_submissions["weekly"], 500);
        assert_eq!(next.participant_state.last_submissions.len(), 1);

        let next = engine.eval_action(&action, &state, &submit("weekly", 120)).await.unwrap();
        assert_eq!(next.participant_state.last_submissions["weekly"], 120);
        assert!(state.participant_state.last_submissions.is_empty());
    }

    #[tokio::test]
    async fn test_non_submit_event_does_not_record() {
        let engine = engine(500);
        let state = ActionData::new(Participant::new("p"));
        let event = StudyEvent::new("i", "s", StudyEventType::Timer);
        let next = engine
            .eval_action(&Expression::new("REMOVE_ALL_MESSAGES"), &state, &event)
            .await
            .unwrap();
        assert!(next.participant_state.last_submissions.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let engine = engine(0);
        let state = ActionData::new(Participant::new("p"));
        let event = StudyEvent::new("i", "s", StudyEventType::Timer);
        let err = engine
            .eval_action(&Expression::new("checkEventType").str("TIMER"), &state, &event)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownAction(_)));
    }
}
