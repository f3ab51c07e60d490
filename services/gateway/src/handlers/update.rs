//! `commands.gateway.message-update` v1 — grounded on `gateway/src/handlers/update_command.py`.

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::GatewayDeps;

pub async fn message_update_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(envelope, deps).await;
    (result, scratch)
}

async fn run(envelope: Envelope, deps: GatewayDeps) -> Result<Value, ControlError> {
    let payload = envelope.payload.as_object().ok_or_else(|| ControlError::MalformedEnvelope("update payload not an object".into()))?;

    let chat_id = payload.get("chat_id").and_then(Value::as_str).unwrap_or_default();
    let text = payload.get("text").and_then(Value::as_str).unwrap_or_default();
    let message_id = payload.get("message_id").and_then(Value::as_str).unwrap_or_default();

    if chat_id.is_empty() || text.is_empty() || message_id.is_empty() {
        tracing::error!(correlation_id = %envelope.correlation_id, "malformed update payload, aborting");
        return Ok(json!(null));
    }

    deps.chat
        .edit_caption(chat_id, message_id, text)
        .await
        .map_err(|e| ControlError::ChatApiError(e.to_string()))?;

    Ok(json!(null))
}
