//! Conditions over the participant's previously stored responses

use super::Args;
use crate::error::{Result, RuntimeError};
use crate::persistence::ResponseQuery;
use studyflow_core::{ExprValue, StudyEvent, StudyEventType};
use tracing::debug;

/// How many historical responses must satisfy the condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    All,
    Any,
    AtLeast(usize),
}

impl Policy {
    fn parse(args: &Args<'_>, value: Option<ExprValue>) -> Result<Self> {
        match value {
            None => Ok(Policy::All),
            Some(ExprValue::Str(s)) => match s.as_str() {
                "" | "all" => Ok(Policy::All),
                "any" => Ok(Policy::Any),
                other => other
                    .trim()
                    .parse::<usize>()
                    .map(Policy::AtLeast)
                    .map_err(|_| {
                        RuntimeError::invalid_args(
                            args.name(),
                            format!("unknown policy '{}', expected all, any or a count", other),
                        )
                    }),
            },
            Some(ExprValue::Num(n)) if n >= 0.0 => Ok(Policy::AtLeast(n as usize)),
            Some(other) => Err(RuntimeError::invalid_args(
                args.name(),
                format!("invalid policy {}", other),
            )),
        }
    }
}

/// `checkConditionForOldResponses(condition, policy?, surveyKey?, since?, until?)`
///
/// Responses are read newest-first, at most `MAX_HISTORY_RESPONSES`, and the
/// condition is evaluated against each one as if it had just been submitted.
pub(super) async fn check_condition_for_old_responses(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_range(1, 5)?;
    let condition = args.raw(0).and_then(|arg| arg.expression()).ok_or_else(|| {
        RuntimeError::invalid_args(args.name(), "first argument must be an expression")
    })?;

    let policy = Policy::parse(args, args.opt_value(1).await?)?;
    let survey_key = args.opt_string(2).await?;
    let since = args.opt_timestamp(3).await?;
    let until = args.opt_timestamp(4).await?;

    if policy == Policy::AtLeast(0) {
        return Ok(ExprValue::Bool(true));
    }

    let event = args.ctx.event;
    let mut query = ResponseQuery::for_participant(&args.ctx.participant_state.participant_id)
        .with_window(since, until);
    if let Some(key) = survey_key {
        query = query.with_survey_key(key);
    }

    let responses = args
        .engine
        .db
        .get_responses(&event.instance_id, &event.study_key, &query)
        .await?;

    debug!(
        participant = %query.participant_id,
        count = responses.len(),
        ?policy,
        "checking condition against stored responses"
    );

    let condition_ctx = args.ctx.descend(args.engine.max_depth)?;
    let mut matched = 0usize;
    for response in responses {
        let historical = StudyEvent {
            event_type: StudyEventType::Submit,
            response: Some(response),
            ..event.clone()
        };
        let satisfied = args
            .engine
            .eval_condition(condition, condition_ctx.with_event(&historical))
            .await?;

        match policy {
            Policy::All if !satisfied => return Ok(ExprValue::Bool(false)),
            Policy::Any if satisfied => return Ok(ExprValue::Bool(true)),
            Policy::AtLeast(n) if satisfied => {
                matched += 1;
                if matched >= n {
                    return Ok(ExprValue::Bool(true));
                }
            }
            _ => {}
        }
    }

    Ok(ExprValue::Bool(policy == Policy::All))
}
