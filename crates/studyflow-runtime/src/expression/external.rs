//! `externalEventEval(serviceName, route?)`

use super::Args;
use crate::error::{Result, RuntimeError};
use crate::external::ExternalEventPayload;
use studyflow_core::ExprValue;

pub(super) async fn external_event_eval(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_range(1, 2)?;
    let service = args.string(0).await?;
    let route = args.opt_string(1).await?;

    let payload = ExternalEventPayload::new(args.ctx.participant_state, args.ctx.event);
    let response = args
        .engine
        .gateway
        .call(&service, route.as_deref(), &payload)
        .await?;

    let value = response.value.ok_or_else(|| {
        RuntimeError::NotFound(format!("value in response from external service '{}'", service))
    })?;

    if args.expression.return_type.as_deref() == Some("float") {
        return coerce_float(&value).map(ExprValue::Num).ok_or_else(|| {
            RuntimeError::type_mismatch(
                args.name(),
                format!("service '{}' returned {}, expected a float", service, value),
            )
        });
    }

    ExprValue::from_json(&value).map_err(|e| RuntimeError::type_mismatch(args.name(), e))
}

fn coerce_float(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
