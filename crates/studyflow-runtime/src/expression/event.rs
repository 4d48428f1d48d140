//! Event introspection

use super::Args;
use crate::error::{Result, RuntimeError};
use studyflow_core::{ExprValue, StudyEventType};

pub(super) async fn check_event_type(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let event_type = args.string(0).await?;
    Ok(ExprValue::Bool(args.ctx.event.event_type.as_str() == event_type))
}

pub(super) async fn check_event_key(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    Ok(ExprValue::Bool(args.ctx.event.event_key == key))
}

/// Only a `SUBMIT` event carries a survey response to check
pub(super) async fn check_survey_response_key(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let event = args.ctx.event;
    let matches = event.event_type == StudyEventType::Submit
        && event.response.as_ref().map_or(false, |r| r.key == key);
    Ok(ExprValue::Bool(matches))
}

pub(super) fn has_event_payload(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(0)?;
    Ok(ExprValue::Bool(!args.ctx.event.payload.is_empty()))
}

pub(super) async fn has_event_payload_key(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    Ok(ExprValue::Bool(args.ctx.event.payload.contains_key(&key)))
}

pub(super) async fn get_event_payload_value_as_str(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let value = match args.ctx.event.payload.get(&key) {
        None => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(RuntimeError::type_mismatch(
                args.name(),
                format!("payload value '{}' is not a string: {}", key, other),
            ))
        }
    };
    Ok(ExprValue::Str(value))
}

pub(super) async fn get_event_payload_value_as_num(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let value = match args.ctx.event.payload.get(&key) {
        None => 0.0,
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            RuntimeError::type_mismatch(
                args.name(),
                format!("payload value '{}' is not numeric: {}", key, s),
            )
        })?,
        Some(other) => {
            return Err(RuntimeError::type_mismatch(
                args.name(),
                format!("payload value '{}' is not a number: {}", key, other),
            ))
        }
    };
    Ok(ExprValue::Num(value))
}
