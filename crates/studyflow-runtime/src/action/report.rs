//! Report actions
//!
//! Reports are collected in `ActionData::reports_to_create`, one per key, and
//! handed back to the caller for storage.

use crate::context::ActionData;
use crate::error::Result;
use crate::expression::Args;
use studyflow_core::{ExprValue, Report, ReportData, StudyEvent, StudyEventType};

fn new_report(args: &Args<'_>, state: &ActionData, key: &str) -> Report {
    let mut report = Report::new(
        key,
        state.participant_state.participant_id.clone(),
        args.engine.now(),
    );
    report.response_id = response_id(args.ctx.event);
    report
}

/// Id of the submitted response, for reports created by a submission
fn response_id(event: &StudyEvent) -> Option<String> {
    if event.event_type != StudyEventType::Submit {
        return None;
    }
    event
        .response
        .as_ref()
        .map(|r| r.id.clone())
        .filter(|id| !id.is_empty())
}

/// `INIT_REPORT(key)` creates the report or resets an existing one
pub(super) async fn init_report(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let mut next = state.clone();
    let report = new_report(args, state, &key);
    next.reports_to_create.insert(key, report);
    Ok(next)
}

/// `UPDATE_REPORT_DATA(key, attributeKey, value, dtype?)`
///
/// With `dtype` "int" numbers are written without fraction.
pub(super) async fn update_report_data(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_range(3, 4)?;
    let key = args.string(0).await?;
    let attribute = args.string(1).await?;
    let value = args.value(2).await?;
    let dtype = args.opt_string(3).await?;

    let value = match (&value, dtype.as_deref()) {
        (ExprValue::Num(n), Some("int")) => (n.trunc() as i64).to_string(),
        _ => value.to_string(),
    };

    let mut next = state.clone();
    next.reports_to_create
        .entry(key.clone())
        .or_insert_with(|| new_report(args, state, &key))
        .upsert(ReportData {
            key: attribute,
            value,
            dtype,
        });
    Ok(next)
}

pub(super) async fn remove_report_data(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(2)?;
    let key = args.string(0).await?;
    let attribute = args.string(1).await?;
    let mut next = state.clone();
    if let Some(report) = next.reports_to_create.get_mut(&key) {
        report.remove(&attribute);
    }
    Ok(next)
}

pub(super) async fn cancel_report(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_count(1)?;
    let key = args.string(0).await?;
    let mut next = state.clone();
    next.reports_to_create.remove(&key);
    Ok(next)
}
