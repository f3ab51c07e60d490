//! `commands.gateway.reply` v1 — grounded on `gateway/src/handlers/reply_command.py`.

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::GatewayDeps;

pub async fn reply_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(envelope, deps).await;
    (result, scratch)
}

async fn run(envelope: Envelope, deps: GatewayDeps) -> Result<Value, ControlError> {
    let payload = envelope.payload.as_object().ok_or_else(|| ControlError::MalformedEnvelope("reply payload not an object".into()))?;

    let chat_id = payload.get("chat_id").and_then(Value::as_str).unwrap_or_default();
    let text = payload.get("text").and_then(Value::as_str).unwrap_or_default();
    let reply_to = payload.get("reply_to_message_id").and_then(Value::as_str);

    if chat_id.is_empty() || text.is_empty() {
        tracing::error!(correlation_id = %envelope.correlation_id, "malformed reply payload, aborting");
        return Ok(json!(null));
    }

    let sent = deps
        .chat
        .send_message(chat_id, text, reply_to)
        .await
        .map_err(|e| ControlError::ChatApiError(e.to_string()))?;

    if let Some(persistence_key) = payload.get("persistence_key").and_then(Value::as_str) {
        let key = format!("correlation_id:{}:{persistence_key}", envelope.correlation_id);
        deps.cache.hset(&key, "message_id", &sent.message_id).await?;
        deps.cache.hset(&key, "chat_id", chat_id).await?;
    }

    Ok(json!({ "message_id": sent.message_id }))
}
