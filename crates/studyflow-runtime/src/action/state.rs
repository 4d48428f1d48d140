//! Actions that rewrite the participant state

use crate::context::ActionData;
use crate::error::{Result, RuntimeError};
use crate::expression::Args;
use rand::RngCore;
use studyflow_core::{AssignedSurvey, ParticipantMessage};
use uuid::Uuid;

pub(super) async fn update_study_status(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(1)?;
    let status = args.string(0).await?;
    let mut next = state.clone();
    next.participant_state.study_status = status;
    Ok(next)
}

/// Session ids are the current time in hex followed by four random bytes
pub(super) fn start_new_study_session(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(0)?;
    let mut next = state.clone();
    next.participant_state.current_study_session = new_session_id(args.engine.now());
    Ok(next)
}

fn new_session_id(now: i64) -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{:x}{}", now, suffix)
}

pub(super) async fn update_flag(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(2)?;
    let key = args.string(0).await?;
    let value = args.value(1).await?.to_string();
    let mut next = state.clone();
    next.participant_state.flags.insert(key, value);
    Ok(next)
}

pub(super) async fn remove_flag(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let mut next = state.clone();
    next.participant_state.flags.remove(&key);
    Ok(next)
}

pub(super) async fn set_linking_code(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(2)?;
    let key = args.string(0).await?;
    let value = args.value(1).await?.to_string();
    let mut next = state.clone();
    next.participant_state.linking_codes.insert(key, value);
    Ok(next)
}

/// Without a key every linking code is removed
pub(super) async fn delete_linking_code(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_range(0, 1)?;
    let key = args.opt_value(0).await?;
    let mut next = state.clone();
    match key {
        Some(key) => {
            next.participant_state.linking_codes.remove(&key.to_string());
        }
        None => next.participant_state.linking_codes.clear(),
    }
    Ok(next)
}

/// `ADD_NEW_SURVEY(surveyKey, validFrom, validUntil, category)`
pub(super) async fn add_new_survey(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(4)?;
    let survey_key = args.string(0).await?;
    let valid_from = args.num(1).await?.trunc() as i64;
    let valid_until = args.num(2).await?.trunc() as i64;
    let category = args.string(3).await?;

    let mut next = state.clone();
    next.participant_state.assigned_surveys.push(AssignedSurvey {
        survey_key,
        study_key: args.ctx.event.study_key.clone(),
        valid_from,
        valid_until,
        category,
        profile_id: None,
    });
    Ok(next)
}

pub(super) fn remove_all_surveys(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(0)?;
    let mut next = state.clone();
    next.participant_state.assigned_surveys.clear();
    Ok(next)
}

/// `REMOVE_SURVEY_BY_KEY(surveyKey, "first" | "last")` removes one assignment
pub(super) async fn remove_survey_by_key(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_count(2)?;
    let survey_key = args.string(0).await?;
    let position = args.string(1).await?;

    let surveys = &state.participant_state.assigned_surveys;
    let mut matching = surveys
        .iter()
        .enumerate()
        .filter(|(_, s)| s.survey_key == survey_key)
        .map(|(i, _)| i);
    let index = match position.as_str() {
        "first" => matching.next(),
        "last" => matching.last(),
        other => {
            return Err(RuntimeError::invalid_args(
                args.name(),
                format!("position must be 'first' or 'last', got '{}'", other),
            ))
        }
    };

    let mut next = state.clone();
    if let Some(index) = index {
        next.participant_state.assigned_surveys.remove(index);
    }
    Ok(next)
}

pub(super) async fn remove_surveys_by_key(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_count(1)?;
    let survey_key = args.string(0).await?;
    let mut next = state.clone();
    next.participant_state
        .assigned_surveys
        .retain(|s| s.survey_key != survey_key);
    Ok(next)
}

/// `ADD_MESSAGE(messageType, scheduledFor)`
pub(super) async fn add_message(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(2)?;
    let message_type = args.string(0).await?;
    let scheduled_for = args.num(1).await?.trunc() as i64;
    let mut next = state.clone();
    next.participant_state.messages.push(ParticipantMessage {
        id: Uuid::new_v4().to_string(),
        message_type,
        scheduled_for,
    });
    Ok(next)
}

pub(super) fn remove_all_messages(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(0)?;
    let mut next = state.clone();
    next.participant_state.messages.clear();
    Ok(next)
}

pub(super) async fn remove_messages_by_type(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_count(1)?;
    let message_type = args.string(0).await?;
    let mut next = state.clone();
    next.participant_state
        .messages
        .retain(|m| m.message_type != message_type);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id(0x65a1_b2c3);
        assert!(id.starts_with("65a1b2c3"));
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
