//! Actions backed by the persistence port

use crate::context::ActionData;
use crate::error::{Result, RuntimeError};
use crate::expression::Args;
use std::collections::HashMap;
use studyflow_core::StudyMessage;
use tracing::{info, warn};
use uuid::Uuid;

/// `NOTIFY_RESEARCHER(messageType, key1, value1, ...)`
///
/// Saving the message is best effort; a failure is logged and the state is
/// returned unchanged.
pub(super) async fn notify_researcher(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_at_least(1)?;
    if args.len() % 2 == 0 {
        return Err(RuntimeError::invalid_args(
            args.name(),
            "expected a message type followed by key/value pairs",
        ));
    }

    let message_type = args.string(0).await?;
    let mut payload = HashMap::new();
    for index in (1..args.len()).step_by(2) {
        let key = args.string(index).await?;
        let value = args.value(index + 1).await?.to_string();
        payload.insert(key, value);
    }

    let message = StudyMessage {
        id: Uuid::new_v4().to_string(),
        message_type,
        participant_id: state.participant_state.participant_id.clone(),
        payload,
    };

    let event = args.ctx.event;
    if let Err(e) = args
        .engine
        .db
        .save_researcher_message(&event.instance_id, &event.study_key, message)
        .await
    {
        warn!(
            study_key = %event.study_key,
            error = %e,
            "failed to save researcher notification"
        );
    }
    Ok(state.clone())
}

/// Confidential responses are stored under the event's override id when given
fn confidential_participant_id(args: &Args<'_>, state: &ActionData) -> String {
    args.ctx
        .event
        .participant_id_for_confidential_responses
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| state.participant_state.participant_id.clone())
}

async fn delete_confidential(args: &Args<'_>, state: &ActionData, key: Option<&str>) -> Result<()> {
    let event = args.ctx.event;
    let participant_id = confidential_participant_id(args, state);
    let deleted = args
        .engine
        .db
        .delete_confidential_responses(&event.instance_id, &event.study_key, &participant_id, key)
        .await?;
    info!(
        study_key = %event.study_key,
        key = key.unwrap_or("*"),
        deleted,
        "removed confidential responses"
    );
    Ok(())
}

pub(super) async fn remove_confidential_response_by_key(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    delete_confidential(args, state, Some(&key)).await?;
    Ok(state.clone())
}

pub(super) async fn remove_all_confidential_responses(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_count(0)?;
    delete_confidential(args, state, None).await?;
    Ok(state.clone())
}

pub(super) async fn remove_study_code(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(2)?;
    let list_key = args.string(0).await?;
    let code = args.value(1).await?.to_string();
    let event = args.ctx.event;
    args.engine
        .db
        .delete_study_code_list_entry(&event.instance_id, &event.study_key, &list_key, &code)
        .await?;
    Ok(state.clone())
}

/// `DRAW_STUDY_CODE_AS_LINKING_CODE(listKey, linkingCodeKey?)`
///
/// The linking code key defaults to the list key. When the list is empty the
/// linking code is removed.
pub(super) async fn draw_study_code_as_linking_code(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_range(1, 2)?;
    let list_key = args.string(0).await?;
    let linking_code_key = args
        .opt_string(1)
        .await?
        .unwrap_or_else(|| list_key.clone());

    let event = args.ctx.event;
    let code = args
        .engine
        .db
        .draw_study_code(&event.instance_id, &event.study_key, &list_key)
        .await?;

    let mut next = state.clone();
    match code.filter(|c| !c.is_empty()) {
        Some(code) => {
            next.participant_state
                .linking_codes
                .insert(linking_code_key, code);
        }
        None => {
            warn!(list_key = %list_key, "study code list is empty");
            next.participant_state.linking_codes.remove(&linking_code_key);
        }
    }
    Ok(next)
}
