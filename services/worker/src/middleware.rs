//! Worker-side middleware: the rate-limit increment + optimistic-reply
//! after-middleware (§4.9 final paragraph).

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::queues::GATEWAY_EVENTS;
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::WorkerDeps;

const OPTIMISTIC_REPLY_TEXT: &str = "⏳ Processing…";

/// Opt-in after-middleware on the command-mapping route: when the handler
/// signaled `scratch.increase_rate_limit`, charge the rate-limit counter for
/// the user and publish an optimistic "processing…" reply tagged with
/// `persistence_key = "optimistic_reply"` so the gateway can delete it once
/// the real media is delivered.
pub async fn maybe_rate_limit_increment(envelope: Envelope, deps: WorkerDeps, scratch: Scratch) -> (Result<bool, ControlError>, Scratch) {
    if !scratch.increase_rate_limit {
        return (Ok(true), scratch);
    }

    let result = run(&envelope, &deps, &scratch).await;
    (result, scratch)
}

async fn run(envelope: &Envelope, deps: &WorkerDeps, scratch: &Scratch) -> Result<bool, ControlError> {
    let user_id = scratch.extra.get("rate_limit_user_id").and_then(Value::as_i64).ok_or_else(|| ControlError::ContextCorruption {
        expected: "rate_limit_user_id in scratch".into(),
        found: "missing".into(),
    })?;
    let chat_id = scratch.extra.get("rate_limit_chat_id").and_then(Value::as_str).unwrap_or_default();
    let message_id = scratch.extra.get("rate_limit_message_id").and_then(Value::as_str).unwrap_or_default();

    deps.rate_limiter.increment(user_id).await?;

    let reply = envelope.derive(
        "commands.gateway.reply",
        json!({
            "chat_id": chat_id,
            "text": OPTIMISTIC_REPLY_TEXT,
            "reply_to_message_id": message_id,
            "persistence_key": "optimistic_reply",
        }),
    )?;
    deps.broker
        .publish(GATEWAY_EVENTS, &reply.to_wire()?)
        .await
        .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;

    Ok(true)
}
