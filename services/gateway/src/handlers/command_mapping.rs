//! `events.telegram.raw` v1, gateway side — only ever reached for admin
//! users, since the ingress path publishes to `gateway_events` exclusively
//! for them (§4.7 step 7). Maps the `.grace`/`.smite` command tokens to
//! their command events, the same token-mapping idiom the worker applies to
//! `.vdl`/`.adl` (§4.9).

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::queues::GATEWAY_EVENTS;
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::GatewayDeps;

pub async fn command_mapping_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(envelope, deps).await;
    (result, scratch)
}

async fn run(envelope: Envelope, deps: GatewayDeps) -> Result<Value, ControlError> {
    let token = envelope
        .payload
        .get("filtered_parts")
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mapped_type = match token {
        ".grace" => "commands.gateway.grace",
        ".smite" => "commands.gateway.smite",
        _ => return Ok(json!(null)),
    };

    let derived = envelope.derive(mapped_type, envelope.payload.clone())?;
    let body = derived.to_wire()?;
    deps.broker
        .publish(GATEWAY_EVENTS, &body)
        .await
        .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;

    Ok(json!({ "mapped_to": mapped_type }))
}
