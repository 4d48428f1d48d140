//! Participant state introspection
//!
//! All handlers here read either the current participant state or, under the
//! `incomingState:` prefix, the participant supplied with a merge event.

use super::Args;
use crate::context::StateSource;
use crate::error::Result;
use studyflow_core::{ExprValue, Participant};

fn state<'a>(args: &Args<'a>, source: StateSource) -> Result<&'a Participant> {
    args.ctx.state(source, &args.expression.name)
}

pub(super) fn study_entry_time(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(0)?;
    Ok(ExprValue::from(state(args, source)?.entered_at))
}

pub(super) async fn has_survey_key_assigned(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let assigned = state(args, source)?
        .assigned_surveys
        .iter()
        .any(|s| s.survey_key == key);
    Ok(ExprValue::Bool(assigned))
}

/// `validFrom` of the first assignment of the survey, -1 when not assigned
pub(super) async fn survey_key_assigned_from(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let from = state(args, source)?
        .assigned_surveys
        .iter()
        .find(|s| s.survey_key == key)
        .map_or(-1, |s| s.valid_from);
    Ok(ExprValue::from(from))
}

/// `validUntil` of the first assignment of the survey, -1 when not assigned
pub(super) async fn survey_key_assigned_until(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let until = state(args, source)?
        .assigned_surveys
        .iter()
        .find(|s| s.survey_key == key)
        .map_or(-1, |s| s.valid_until);
    Ok(ExprValue::from(until))
}

pub(super) async fn has_study_status(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(1)?;
    let status = args.string(0).await?;
    Ok(ExprValue::Bool(state(args, source)?.study_status == status))
}

pub(super) async fn has_flag_key(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    Ok(ExprValue::Bool(state(args, source)?.flags.contains_key(&key)))
}

pub(super) async fn has_flag_key_and_value(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_count(2)?;
    let key = args.string(0).await?;
    let value = args.value(1).await?.to_string();
    let matches = state(args, source)?
        .flags
        .get(&key)
        .map_or(false, |v| *v == value);
    Ok(ExprValue::Bool(matches))
}

pub(super) async fn flag_value(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let value = state(args, source)?.flags.get(&key).cloned().unwrap_or_default();
    Ok(ExprValue::Str(value))
}

pub(super) async fn has_linking_code(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    Ok(ExprValue::Bool(state(args, source)?.linking_codes.contains_key(&key)))
}

pub(super) async fn linking_code_value(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let value = state(args, source)?
        .linking_codes
        .get(&key)
        .cloned()
        .unwrap_or_default();
    Ok(ExprValue::Str(value))
}

fn last_submission(participant: &Participant, survey_key: Option<&str>) -> i64 {
    match survey_key {
        Some(key) => participant.last_submissions.get(key).copied().unwrap_or(0),
        None => participant
            .last_submissions
            .values()
            .copied()
            .max()
            .unwrap_or(0),
    }
}

/// Latest submission for a survey key, or over all surveys; 0 when none
pub(super) async fn last_submission_date(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_range(0, 1)?;
    let survey_key = args.opt_string(0).await?;
    let ts = last_submission(state(args, source)?, survey_key.as_deref());
    Ok(ExprValue::from(ts))
}

/// `lastSubmissionDateOlderThan(refTime, surveyKey?)`
///
/// A participant who never submitted counts as older than any reference.
pub(super) async fn last_submission_older_than(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_range(1, 2)?;
    let reference = args.num(0).await? as i64;
    let survey_key = args.opt_string(1).await?;
    let ts = last_submission(state(args, source)?, survey_key.as_deref());
    Ok(ExprValue::Bool(ts < reference))
}

pub(super) async fn has_message_type_assigned(
    args: &Args<'_>,
    source: StateSource,
) -> Result<ExprValue> {
    args.expect_count(1)?;
    let message_type = args.string(0).await?;
    let assigned = state(args, source)?
        .messages
        .iter()
        .any(|m| m.message_type == message_type);
    Ok(ExprValue::Bool(assigned))
}

/// Earliest `scheduledFor` of the message type, 0 when none is assigned
pub(super) async fn message_next_time(args: &Args<'_>, source: StateSource) -> Result<ExprValue> {
    args.expect_count(1)?;
    let message_type = args.string(0).await?;
    let next = state(args, source)?
        .messages
        .iter()
        .filter(|m| m.message_type == message_type)
        .map(|m| m.scheduled_for)
        .min()
        .unwrap_or(0);
    Ok(ExprValue::from(next))
}
