//! Gateway-side middleware: the correlation guard pair (§4.3), the
//! start-time cleanup opt-in (§4.8 step 7), and the disk-cleanup trigger
//! counter (§4.11).

use control_core::correlation::correlation_id;
use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::queues::GATEWAY_EVENTS;
use control_core::router::Scratch;
use serde_json::json;

use crate::deps::GatewayDeps;

const CLEANUP_EVENT_COUNTER_KEY: &str = "cleanup_event_counter";
const CLEANUP_EVENT_COUNTER_TTL: std::time::Duration = std::time::Duration::from_secs(86_400);
const CLEANUP_TRIGGER_AT: i64 = 100;
const CLEANUP_MAX_DELETE: u64 = 100;

/// Before-middleware: stamps the live correlation id into `scratch` so the
/// matching after-middleware can detect any loss or crossover across an
/// async boundary during dispatch.
pub async fn correlation_guard_prepare(_envelope: Envelope, _deps: GatewayDeps, mut scratch: Scratch) -> (Result<bool, ControlError>, Scratch) {
    scratch.correlation_snapshot = Some(correlation_id());
    (Ok(true), scratch)
}

/// After-middleware: asserts the task-local correlation id still matches
/// what was snapshotted before the handler ran.
pub async fn correlation_guard_assert(envelope: Envelope, _deps: GatewayDeps, scratch: Scratch) -> (Result<bool, ControlError>, Scratch) {
    let live = correlation_id();
    match &scratch.correlation_snapshot {
        Some(expected) if *expected == live => (Ok(true), scratch),
        Some(expected) => (
            Err(ControlError::ContextCorruption {
                expected: expected.clone(),
                found: live,
            }),
            scratch,
        ),
        None => (
            Err(ControlError::ContextCorruption {
                expected: envelope.correlation_id,
                found: live,
            }),
            scratch,
        ),
    }
}

/// After-middleware, opt-in on the ready routes: when the handler signaled
/// `scratch.cleanup_correlation_start_time`, drop the `start_time` field
/// recorded at ingress (§4.7 step 5).
pub async fn maybe_cleanup_correlation_redis(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<bool, ControlError>, Scratch) {
    if scratch.cleanup_correlation_start_time {
        let key = format!("correlation_id:{}", envelope.correlation_id);
        if let Err(e) = deps.cache.hdel(&key, &["start_time"]).await {
            tracing::warn!(error = %e, "failed to clean up correlation start_time");
        }
    }
    (Ok(true), scratch)
}

/// Global after-middleware: every dispatched event (successful or not)
/// advances a TTL'd counter; at 100 it resets and publishes a
/// `downloads-cleanup` command (§4.11). Counting every event, not only
/// successful deliveries, is an Open Question decision — see DESIGN.md.
pub async fn cleanup_event_counter(_envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<bool, ControlError>, Scratch) {
    let result = run(deps).await;
    (result, scratch)
}

async fn run(deps: GatewayDeps) -> Result<bool, ControlError> {
    let count = deps.cache.increment(CLEANUP_EVENT_COUNTER_KEY).await?;
    if count == 1 {
        deps.cache.expire(CLEANUP_EVENT_COUNTER_KEY, CLEANUP_EVENT_COUNTER_TTL).await?;
    }

    if count >= CLEANUP_TRIGGER_AT {
        deps.cache.set(CLEANUP_EVENT_COUNTER_KEY, "0", Some(CLEANUP_EVENT_COUNTER_TTL)).await?;
        let envelope = Envelope::create("commands.gateway.downloads-cleanup", json!({ "max_delete": CLEANUP_MAX_DELETE }))?;
        let body = envelope.to_wire()?;
        deps.broker
            .publish(GATEWAY_EVENTS, &body)
            .await
            .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;
        tracing::info!("cleanup_event_counter reached threshold, published downloads-cleanup");
    }

    Ok(true)
}
