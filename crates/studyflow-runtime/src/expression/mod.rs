//! Expression evaluator
//!
//! Resolves a named expression node against an evaluation context. The name is
//! looked up once in the registry and the resulting kind is matched
//! exhaustively; each handler validates its own arguments through [`Args`].
//!
//! Nested `exp` arguments recurse through [`StudyEngine::eval_expr`], which
//! returns a boxed future so that the recursion has a finite size. Every level
//! of nesting is checked against the engine's maximum depth.

mod event;
mod external;
mod history;
mod logic;
mod participant;
mod response;
mod study_data;
mod time;

use crate::context::EvalContext;
use crate::engine::registry::{lookup_expression, ExpressionKind};
use crate::engine::StudyEngine;
use crate::error::{Result, RuntimeError};
use std::future::Future;
use std::pin::Pin;
use studyflow_core::{ExprValue, Expression, ExpressionArg, StudyVariableType};

pub(crate) type BoxedEval<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

impl StudyEngine {
    /// Evaluate an expression
    pub async fn evaluate_expression(
        &self,
        expression: &Expression,
        ctx: &EvalContext<'_>,
    ) -> Result<ExprValue> {
        self.eval_expr(expression, *ctx).await
    }

    /// Evaluate an expression used as a condition
    ///
    /// Booleans are taken as is and numbers are true when non-zero. Strings
    /// have no truth value and are rejected.
    pub(crate) async fn eval_condition(
        &self,
        expression: &Expression,
        ctx: EvalContext<'_>,
    ) -> Result<bool> {
        let value = self.eval_expr(expression, ctx).await?;
        value.truthiness().ok_or_else(|| {
            RuntimeError::type_mismatch(
                &expression.name,
                format!("condition evaluated to a {}", value.type_name()),
            )
        })
    }

    pub(crate) fn eval_expr<'a>(
        &'a self,
        expression: &'a Expression,
        ctx: EvalContext<'a>,
    ) -> BoxedEval<'a, ExprValue> {
        Box::pin(async move {
            let (kind, source) = lookup_expression(&expression.name)
                .ok_or_else(|| RuntimeError::UnknownExpression(expression.name.clone()))?;
            let args = Args::new(self, expression, ctx);

            match kind {
                ExpressionKind::CheckEventType => event::check_event_type(&args).await,
                ExpressionKind::CheckEventKey => event::check_event_key(&args).await,
                ExpressionKind::CheckSurveyResponseKey => {
                    event::check_survey_response_key(&args).await
                }
                ExpressionKind::HasEventPayload => event::has_event_payload(&args),
                ExpressionKind::HasEventPayloadKey => event::has_event_payload_key(&args).await,
                ExpressionKind::GetEventPayloadValueAsStr => {
                    event::get_event_payload_value_as_str(&args).await
                }
                ExpressionKind::GetEventPayloadValueAsNum => {
                    event::get_event_payload_value_as_num(&args).await
                }

                ExpressionKind::ResponseHasKeysAny => response::has_keys_any(&args).await,
                ExpressionKind::ResponseHasOnlyKeysOtherThan => {
                    response::has_only_keys_other_than(&args).await
                }
                ExpressionKind::GetResponseValueAsNum => response::value_as_num(&args).await,
                ExpressionKind::GetResponseValueAsStr => response::value_as_str(&args).await,
                ExpressionKind::GetSelectedKeys => response::selected_keys(&args).await,
                ExpressionKind::CountResponseItems => response::count_items(&args).await,
                ExpressionKind::HasResponseKey => response::has_key(&args).await,
                ExpressionKind::HasResponseKeyWithValue => {
                    response::has_key_with_value(&args).await
                }

                ExpressionKind::CheckConditionForOldResponses => {
                    history::check_condition_for_old_responses(&args).await
                }

                ExpressionKind::GetStudyEntryTime => participant::study_entry_time(&args, source),
                ExpressionKind::HasSurveyKeyAssigned => {
                    participant::has_survey_key_assigned(&args, source).await
                }
                ExpressionKind::GetSurveyKeyAssignedFrom => {
                    participant::survey_key_assigned_from(&args, source).await
                }
                ExpressionKind::GetSurveyKeyAssignedUntil => {
                    participant::survey_key_assigned_until(&args, source).await
                }
                ExpressionKind::HasStudyStatus => {
                    participant::has_study_status(&args, source).await
                }
                ExpressionKind::HasParticipantFlagKey => {
                    participant::has_flag_key(&args, source).await
                }
                ExpressionKind::HasParticipantFlagKeyAndValue => {
                    participant::has_flag_key_and_value(&args, source).await
                }
                ExpressionKind::GetParticipantFlagValue => {
                    participant::flag_value(&args, source).await
                }
                ExpressionKind::HasLinkingCode => {
                    participant::has_linking_code(&args, source).await
                }
                ExpressionKind::GetLinkingCodeValue => {
                    participant::linking_code_value(&args, source).await
                }
                ExpressionKind::GetLastSubmissionDate => {
                    participant::last_submission_date(&args, source).await
                }
                ExpressionKind::LastSubmissionDateOlderThan => {
                    participant::last_submission_older_than(&args, source).await
                }
                ExpressionKind::HasMessageTypeAssigned => {
                    participant::has_message_type_assigned(&args, source).await
                }
                ExpressionKind::GetMessageNextTime => {
                    participant::message_next_time(&args, source).await
                }

                ExpressionKind::IsStudyCodePresent => {
                    study_data::is_study_code_present(&args).await
                }
                ExpressionKind::GetCurrentStudyCounterValue => {
                    study_data::current_counter_value(&args).await
                }
                ExpressionKind::GetNextStudyCounterValue => {
                    study_data::next_counter_value(&args).await
                }
                ExpressionKind::GetStudyVariableBoolean => {
                    study_data::study_variable(&args, StudyVariableType::Boolean).await
                }
                ExpressionKind::GetStudyVariableInt => {
                    study_data::study_variable(&args, StudyVariableType::Int).await
                }
                ExpressionKind::GetStudyVariableFloat => {
                    study_data::study_variable(&args, StudyVariableType::Float).await
                }
                ExpressionKind::GetStudyVariableString => {
                    study_data::study_variable(&args, StudyVariableType::String).await
                }
                ExpressionKind::GetStudyVariableDate => {
                    study_data::study_variable(&args, StudyVariableType::Date).await
                }

                ExpressionKind::Eq => logic::compare(&args, logic::Comparison::Eq).await,
                ExpressionKind::Lt => logic::compare(&args, logic::Comparison::Lt).await,
                ExpressionKind::Lte => logic::compare(&args, logic::Comparison::Lte).await,
                ExpressionKind::Gt => logic::compare(&args, logic::Comparison::Gt).await,
                ExpressionKind::Gte => logic::compare(&args, logic::Comparison::Gte).await,
                ExpressionKind::And => logic::and(&args).await,
                ExpressionKind::Or => logic::or(&args).await,
                ExpressionKind::Not => logic::not(&args).await,
                ExpressionKind::Sum => logic::sum(&args).await,
                ExpressionKind::Neg => logic::neg(&args).await,

                ExpressionKind::TimestampWithOffset => time::timestamp_with_offset(&args).await,
                ExpressionKind::GetTsForNextStartOfMonth => {
                    time::next_start_of_month(&args).await
                }
                ExpressionKind::GetTsForNextIsoWeek => time::next_iso_week(&args).await,
                ExpressionKind::GetIsoWeekForTs => time::iso_week_for_ts(&args).await,
                ExpressionKind::DateToStr => time::date_to_str(&args).await,
                ExpressionKind::ParseValueAsNum => time::parse_value_as_num(&args).await,
                ExpressionKind::GenerateRandomNumber => time::generate_random_number(&args).await,

                ExpressionKind::ExternalEventEval => external::external_event_eval(&args).await,
            }
        })
    }

    /// Resolve one argument: literals as is, nested expressions one level deeper
    pub(crate) async fn resolve_arg(
        &self,
        owner: &str,
        arg: &ExpressionArg,
        ctx: EvalContext<'_>,
    ) -> Result<ExprValue> {
        match arg {
            ExpressionArg::Num(n) => Ok(ExprValue::Num(*n)),
            ExpressionArg::Str(s) => Ok(ExprValue::Str(s.clone())),
            ExpressionArg::Exp(Some(nested)) => {
                let child = ctx.descend(self.max_depth)?;
                self.eval_expr(nested, child).await
            }
            ExpressionArg::Exp(None) => Err(RuntimeError::invalid_args(
                owner,
                "nested expression argument is empty",
            )),
        }
    }
}

/// Argument access for one expression or action node
pub(crate) struct Args<'a> {
    pub engine: &'a StudyEngine,
    pub expression: &'a Expression,
    pub ctx: EvalContext<'a>,
}

impl<'a> Args<'a> {
    pub fn new(engine: &'a StudyEngine, expression: &'a Expression, ctx: EvalContext<'a>) -> Self {
        Self {
            engine,
            expression,
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.expression.name
    }

    pub fn len(&self) -> usize {
        self.expression.data.len()
    }

    pub fn raw(&self, index: usize) -> Option<&'a ExpressionArg> {
        self.expression.data.get(index)
    }

    pub fn expect_count(&self, count: usize) -> Result<()> {
        self.expect_range(count, count)
    }

    pub fn expect_range(&self, min: usize, max: usize) -> Result<()> {
        let len = self.len();
        if len < min || len > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(RuntimeError::invalid_args(
                self.name(),
                format!("expected {} arguments, got {}", expected, len),
            ));
        }
        Ok(())
    }

    pub fn expect_at_least(&self, min: usize) -> Result<()> {
        if self.len() < min {
            return Err(RuntimeError::invalid_args(
                self.name(),
                format!("expected at least {} arguments, got {}", min, self.len()),
            ));
        }
        Ok(())
    }

    /// Resolved value of argument `index`
    pub async fn value(&self, index: usize) -> Result<ExprValue> {
        let arg = self.raw(index).ok_or_else(|| {
            RuntimeError::invalid_args(self.name(), format!("missing argument {}", index + 1))
        })?;
        self.engine.resolve_arg(self.name(), arg, self.ctx).await
    }

    /// Resolved value of argument `index`, or `None` when it is not given
    pub async fn opt_value(&self, index: usize) -> Result<Option<ExprValue>> {
        if index >= self.len() {
            return Ok(None);
        }
        self.value(index).await.map(Some)
    }

    pub async fn num(&self, index: usize) -> Result<f64> {
        let value = self.value(index).await?;
        value
            .as_f64()
            .map_err(|e| {
                RuntimeError::type_mismatch(self.name(), format!("argument {}: {}", index + 1, e))
            })
    }

    pub async fn string(&self, index: usize) -> Result<String> {
        match self.value(index).await? {
            ExprValue::Str(s) => Ok(s),
            other => Err(RuntimeError::type_mismatch(
                self.name(),
                format!("argument {}: expected string, got {}", index + 1, other.type_name()),
            )),
        }
    }

    pub async fn opt_num(&self, index: usize) -> Result<Option<f64>> {
        if index >= self.len() {
            return Ok(None);
        }
        self.num(index).await.map(Some)
    }

    /// Optional string argument; an empty string counts as absent
    pub async fn opt_string(&self, index: usize) -> Result<Option<String>> {
        if index >= self.len() {
            return Ok(None);
        }
        let s = self.string(index).await?;
        Ok((!s.is_empty()).then_some(s))
    }

    /// Optional timestamp argument; zero counts as absent
    pub async fn opt_timestamp(&self, index: usize) -> Result<Option<i64>> {
        Ok(self
            .opt_num(index)
            .await?
            .map(|ts| ts as i64)
            .filter(|ts| *ts != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStudyDb;
    use std::sync::Arc;
    use studyflow_core::{Participant, StudyEvent, StudyEventType};

    fn engine() -> StudyEngine {
        StudyEngine::new(Arc::new(InMemoryStudyDb::new()))
    }

    #[tokio::test]
    async fn test_unknown_expression() {
        let engine = engine();
        let event = StudyEvent::new("i", "s", StudyEventType::Enter);
        let participant = Participant::new("p");
        let ctx = EvalContext::new(&event, &participant);

        let err = engine
            .evaluate_expression(&Expression::new("noSuchThing"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownExpression(name) if name == "noSuchThing"));
    }

    #[tokio::test]
    async fn test_empty_nested_argument_is_rejected() {
        let engine = engine();
        let event = StudyEvent::new("i", "s", StudyEventType::Enter);
        let participant = Participant::new("p");
        let ctx = EvalContext::new(&event, &participant);

        let mut expr = Expression::new("not");
        expr.data.push(ExpressionArg::Exp(None));
        let err = engine.evaluate_expression(&expr, &ctx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let engine = StudyEngine::builder(Arc::new(InMemoryStudyDb::new()))
            .with_max_depth(3)
            .build()
            .unwrap();
        let event = StudyEvent::new("i", "s", StudyEventType::Enter);
        let participant = Participant::new("p");
        let ctx = EvalContext::new(&event, &participant);

        let nest = |levels: usize| {
            (0..levels).fold(Expression::new("neg").num(1.0), |inner, _| {
                Expression::new("neg").exp(inner)
            })
        };

        let ok = engine.evaluate_expression(&nest(3), &ctx).await.unwrap();
        assert_eq!(ok, ExprValue::Num(1.0));

        let err = engine.evaluate_expression(&nest(4), &ctx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::DepthLimitExceeded(3)));
    }

    #[tokio::test]
    async fn test_condition_rejects_strings() {
        let engine = engine();
        let event = StudyEvent::new("i", "s", StudyEventType::Enter);
        let participant = Participant::new("p").with_flag("group", "A");
        let ctx = EvalContext::new(&event, &participant);

        let flag = Expression::new("getParticipantFlagValue").str("group");
        let err = engine.eval_condition(&flag, ctx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));

        let count = Expression::new("sum").num(0.0);
        assert!(!engine.eval_condition(&count, ctx).await.unwrap());
    }
}
