//! Study-level lookups through the persistence port

use super::Args;
use crate::error::{Result, RuntimeError};
use chrono::DateTime;
use studyflow_core::{ExprValue, StudyVariable, StudyVariableType};

pub(super) async fn is_study_code_present(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let list_key = args.string(0).await?;
    let code = args.value(1).await?.to_string();
    let event = args.ctx.event;
    let present = args
        .engine
        .db
        .study_code_list_entry_exists(&event.instance_id, &event.study_key, &list_key, &code)
        .await?;
    Ok(ExprValue::Bool(present))
}

pub(super) async fn current_counter_value(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let scope = args.string(0).await?;
    let event = args.ctx.event;
    let value = args
        .engine
        .db
        .get_current_study_counter_value(&event.instance_id, &event.study_key, &scope)
        .await?;
    Ok(ExprValue::from(value))
}

/// Increments the counter; the storage layer makes this atomic
pub(super) async fn next_counter_value(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let scope = args.string(0).await?;
    let event = args.ctx.event;
    let value = args
        .engine
        .db
        .increment_and_get_study_counter_value(&event.instance_id, &event.study_key, &scope)
        .await?;
    Ok(ExprValue::from(value))
}

/// Read a study variable, checking its declared type against the one requested
pub(super) async fn study_variable(
    args: &Args<'_>,
    requested: StudyVariableType,
) -> Result<ExprValue> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let event = args.ctx.event;
    let variable = args
        .engine
        .db
        .get_study_variable(&event.instance_id, &event.study_key, &key)
        .await?
        .ok_or_else(|| RuntimeError::NotFound(format!("study variable '{}'", key)))?;

    if variable.value_type != requested {
        return Err(RuntimeError::type_mismatch(
            args.name(),
            format!(
                "study variable '{}' is declared as {}, not {}",
                key, variable.value_type, requested
            ),
        ));
    }

    variable_value(&variable).ok_or_else(|| {
        RuntimeError::type_mismatch(
            args.name(),
            format!(
                "study variable '{}' holds {} which is not a valid {}",
                key, variable.value, variable.value_type
            ),
        )
    })
}

fn variable_value(variable: &StudyVariable) -> Option<ExprValue> {
    let value = &variable.value;
    match variable.value_type {
        StudyVariableType::Boolean => value.as_bool().map(ExprValue::Bool),
        StudyVariableType::Int => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
            .map(ExprValue::from),
        StudyVariableType::Float => value.as_f64().map(ExprValue::Num),
        StudyVariableType::String => value.as_str().map(ExprValue::from),
        StudyVariableType::Date => match value {
            serde_json::Value::Number(n) => n.as_i64().map(ExprValue::from),
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| ExprValue::from(dt.timestamp())),
            _ => None,
        },
    }
}
