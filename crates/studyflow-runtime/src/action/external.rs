//! `EXTERNAL_EVENT_HANDLER(serviceName, route?)`

use crate::context::ActionData;
use crate::error::Result;
use crate::expression::Args;
use crate::external::ExternalEventPayload;
use tracing::info;

/// Send the event to an external service and merge the returned participant
/// state and reports into the output
pub(super) async fn external_event_handler(
    args: &Args<'_>,
    state: &ActionData,
) -> Result<ActionData> {
    args.expect_range(1, 2)?;
    let service = args.string(0).await?;
    let route = args.opt_string(1).await?;

    let payload = ExternalEventPayload::new(&state.participant_state, args.ctx.event);
    let response = args
        .engine
        .gateway
        .call(&service, route.as_deref(), &payload)
        .await?;

    info!(
        service = %service,
        updates_state = response.participant_state.is_some(),
        reports = response.reports_to_create.as_ref().map_or(0, |r| r.len()),
        "external event handler finished"
    );

    let mut next = state.clone();
    response.apply_to(&mut next);
    Ok(next)
}
