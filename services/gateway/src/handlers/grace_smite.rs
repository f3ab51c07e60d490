//! `commands.gateway.grace` / `commands.gateway.smite` v1 — toggle a chat's
//! access grant and react to the source message. Grounded on
//! `gateway/src/authenticate.py`'s `grace`/`smite` plus the `.grace`/`.smite`
//! command tokens referenced in §4.6/§4.9.

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::GatewayDeps;
use crate::ports::NormalizedMessage;

fn extract_message(envelope: &Envelope) -> Result<NormalizedMessage, ControlError> {
    serde_json::from_value(envelope.payload.clone()).map_err(|e| ControlError::MalformedEnvelope(format!("not a normalized message: {e}")))
}

pub async fn grace_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = toggle(envelope, deps, true).await;
    (result, scratch)
}

pub async fn smite_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = toggle(envelope, deps, false).await;
    (result, scratch)
}

async fn toggle(envelope: Envelope, deps: GatewayDeps, grant: bool) -> Result<Value, ControlError> {
    let message = extract_message(&envelope)?;
    let chat_id: i64 = message
        .chat_id
        .parse()
        .map_err(|_| ControlError::MalformedEnvelope("chat_id not numeric".into()))?;

    if grant {
        deps.authenticator.grace(chat_id).await?;
    } else {
        deps.authenticator.smite(chat_id).await?;
    }

    deps.chat
        .react(&message.chat_id, &message.message_id, "👍")
        .await
        .map_err(|e| ControlError::ChatApiError(e.to_string()))?;

    Ok(json!({ "chat_id": chat_id, "grant": grant }))
}
