//! Control-flow actions: `IF`, `DO`, `IFTHEN`

use crate::context::ActionData;
use crate::error::{Result, RuntimeError};
use crate::expression::Args;
use studyflow_core::Expression;
use tracing::warn;

/// Truth value of the condition at argument `index`
async fn condition(args: &Args<'_>, index: usize) -> Result<bool> {
    let value = args.value(index).await?;
    value.truthiness().ok_or_else(|| {
        RuntimeError::type_mismatch(
            args.name(),
            format!("condition evaluated to a {}", value.type_name()),
        )
    })
}

fn nested_action<'a>(args: &Args<'a>, index: usize) -> Result<&'a Expression> {
    args.raw(index)
        .and_then(|arg| arg.expression())
        .ok_or_else(|| {
            RuntimeError::invalid_args(
                args.name(),
                format!("argument {} must be an action", index + 1),
            )
        })
}

/// Run the nested action at argument `index` one level deeper
async fn run_nested(args: &Args<'_>, index: usize, state: &ActionData) -> Result<ActionData> {
    let action = nested_action(args, index)?;
    let depth = args.ctx.descend(args.engine.max_depth)?.depth();
    args.engine
        .dispatch_action(action, state, args.ctx.event, depth)
        .await
}

/// `IF(condition, then, else?)`
pub(super) async fn if_action(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_range(2, 3)?;
    let branch = if condition(args, 0).await? { 1 } else { 2 };
    if branch >= args.len() {
        return Ok(state.clone());
    }
    run_nested(args, branch, state).await
}

/// `DO(actions...)`: sequential fold, stops at the first failure
pub(super) async fn do_action(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    let mut current = state.clone();
    for index in 0..args.len() {
        let next = run_nested(args, index, &current).await?;
        current = next;
    }
    Ok(current)
}

/// `IFTHEN(condition, actions...)`: best effort, failing actions are skipped
pub(super) async fn if_then(args: &Args<'_>, state: &ActionData) -> Result<ActionData> {
    args.expect_at_least(1)?;
    if !condition(args, 0).await? {
        return Ok(state.clone());
    }

    let mut current = state.clone();
    for index in 1..args.len() {
        match run_nested(args, index, &current).await {
            Ok(next) => current = next,
            Err(e) => warn!(
                action = args.name(),
                index,
                error = %e,
                "skipping failed action"
            ),
        }
    }
    Ok(current)
}
