//! Introspection of the submitted survey response
//!
//! Every handler takes the survey item key first and a dot-path to the response
//! slot second (`rg.scg.1`). A missing item or slot is "no match" for the
//! boolean handlers; only the value getters report it as an error.

use super::Args;
use crate::error::{Result, RuntimeError};
use studyflow_core::{ExprValue, ExpressionArg, ResponseItem};

/// Response slot addressed by the first two arguments
async fn slot<'a>(args: &Args<'a>) -> Result<Option<&'a ResponseItem>> {
    let item_key = args.string(0).await?;
    let slot_key = args.string(1).await?;
    Ok(args
        .ctx
        .event
        .response
        .as_ref()
        .and_then(|response| response.item(&item_key))
        .and_then(|item| item.find(&slot_key)))
}

async fn required_slot<'a>(args: &Args<'a>) -> Result<&'a ResponseItem> {
    slot(args).await?.ok_or_else(|| {
        RuntimeError::NotFound(format!(
            "{}: no response for item '{}' at '{}'",
            args.name(),
            display_arg(args, 0),
            display_arg(args, 1),
        ))
    })
}

fn display_arg(args: &Args<'_>, index: usize) -> String {
    match args.raw(index) {
        Some(ExpressionArg::Str(s)) => s.clone(),
        Some(ExpressionArg::Num(n)) => n.to_string(),
        _ => "<expression>".to_string(),
    }
}

/// Keys given after the item and slot arguments
async fn key_list(args: &Args<'_>) -> Result<Vec<String>> {
    let mut keys = Vec::with_capacity(args.len().saturating_sub(2));
    for index in 2..args.len() {
        keys.push(args.string(index).await?);
    }
    Ok(keys)
}

pub(super) async fn has_keys_any(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_at_least(3)?;
    let keys = key_list(args).await?;
    let found = slot(args)
        .await?
        .map_or(false, |group| group.items.iter().any(|child| keys.contains(&child.key)));
    Ok(ExprValue::Bool(found))
}

/// True when the slot has selections and none of them is one of the keys
pub(super) async fn has_only_keys_other_than(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_at_least(3)?;
    let keys = key_list(args).await?;
    let only_others = slot(args).await?.map_or(false, |group| {
        !group.items.is_empty() && group.items.iter().all(|child| !keys.contains(&child.key))
    });
    Ok(ExprValue::Bool(only_others))
}

pub(super) async fn value_as_num(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let item = required_slot(args).await?;
    let value = item.value.trim().parse::<f64>().map_err(|_| {
        RuntimeError::type_mismatch(
            args.name(),
            format!("response value '{}' is not numeric", item.value),
        )
    })?;
    Ok(ExprValue::Num(value))
}

pub(super) async fn value_as_str(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let item = required_slot(args).await?;
    Ok(ExprValue::Str(item.value.clone()))
}

pub(super) async fn selected_keys(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let joined = slot(args)
        .await?
        .map(|group| {
            group
                .items
                .iter()
                .map(|child| child.key.as_str())
                .collect::<Vec<_>>()
                .join(";")
        })
        .unwrap_or_default();
    Ok(ExprValue::Str(joined))
}

/// Number of children of the slot, -1 when the slot is missing
pub(super) async fn count_items(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let count = slot(args)
        .await?
        .map_or(-1.0, |group| group.items.len() as f64);
    Ok(ExprValue::Num(count))
}

pub(super) async fn has_key(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    Ok(ExprValue::Bool(slot(args).await?.is_some()))
}

pub(super) async fn has_key_with_value(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(3)?;
    let expected = args.value(2).await?.to_string();
    let matches = slot(args)
        .await?
        .map_or(false, |item| item.value == expected);
    Ok(ExprValue::Bool(matches))
}
