//! Comparison, boolean logic and arithmetic

use super::Args;
use crate::error::{Result, RuntimeError};
use std::cmp::Ordering;
use studyflow_core::ExprValue;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Comparison {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
        }
    }
}

/// Compare two numbers or two strings; booleans only support `eq`
pub(super) async fn compare(args: &Args<'_>, op: Comparison) -> Result<ExprValue> {
    args.expect_count(2)?;
    let left = args.value(0).await?;
    let right = args.value(1).await?;

    let ordering = match (&left, &right) {
        (ExprValue::Num(l), ExprValue::Num(r)) => l.partial_cmp(r),
        (ExprValue::Str(l), ExprValue::Str(r)) => Some(l.cmp(r)),
        (ExprValue::Bool(l), ExprValue::Bool(r)) if op == Comparison::Eq => Some(l.cmp(r)),
        _ => {
            return Err(RuntimeError::type_mismatch(
                args.name(),
                format!("cannot compare {} with {}", left.type_name(), right.type_name()),
            ))
        }
    };

    // NaN compares false under every operator
    Ok(ExprValue::Bool(ordering.map_or(false, |o| op.holds(o))))
}

/// Truth value of argument `index`; strings have none and are skipped
async fn operand(args: &Args<'_>, index: usize) -> Result<Option<bool>> {
    let value = args.value(index).await?;
    let truth = value.truthiness();
    if truth.is_none() {
        debug!(
            expression = args.name(),
            argument = index + 1,
            "ignoring string operand in boolean expression"
        );
    }
    Ok(truth)
}

pub(super) async fn and(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_at_least(2)?;
    for index in 0..args.len() {
        if operand(args, index).await? == Some(false) {
            return Ok(ExprValue::Bool(false));
        }
    }
    Ok(ExprValue::Bool(true))
}

pub(super) async fn or(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_at_least(2)?;
    for index in 0..args.len() {
        if operand(args, index).await? == Some(true) {
            return Ok(ExprValue::Bool(true));
        }
    }
    Ok(ExprValue::Bool(false))
}

pub(super) async fn not(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let value = args.value(0).await?;
    let truth = value.truthiness().ok_or_else(|| {
        RuntimeError::type_mismatch(args.name(), "cannot negate a string")
    })?;
    Ok(ExprValue::Bool(!truth))
}

/// Booleans count as 0 or 1. String terms are skipped with a warning.
pub(super) async fn sum(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_at_least(1)?;
    let mut total = 0.0;
    for index in 0..args.len() {
        match args.value(index).await? {
            ExprValue::Num(n) => total += n,
            ExprValue::Bool(b) => total += if b { 1.0 } else { 0.0 },
            ExprValue::Str(s) => warn!(
                expression = args.name(),
                argument = index + 1,
                value = %s,
                "skipping non-numeric term in sum"
            ),
        }
    }
    Ok(ExprValue::Num(total))
}

pub(super) async fn neg(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    Ok(ExprValue::Num(-args.num(0).await?))
}
