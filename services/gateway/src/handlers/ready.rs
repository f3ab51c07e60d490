//! `events.dl.video.ready` / `events.dl.audio.ready` v1 — the media delivery
//! algorithm of §4.8, grounded on `gateway/src/handlers/video_ready_event.py`
//! and `audio_ready_event.py` (identical shape, differing only in which
//! chat-send method and cache-key prefix is used).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::resilience::coalesce_backoff;
use control_core::router::Scratch;
use control_core::staging::MediaKind;
use serde_json::{json, Value};
use url::Url;

use crate::deps::GatewayDeps;
use crate::optimistic_reply::cleanup_optimistic_reply;

pub async fn video_ready_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    deliver(MediaKind::Video, envelope, deps, scratch).await
}

pub async fn audio_ready_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    deliver(MediaKind::Audio, envelope, deps, scratch).await
}

/// Strip query/fragment to get the base URL the content-id hash is computed
/// against — distinct from `staging::normalize_url`, which also lowercases
/// the host and trims the path; here we mirror the presigned-URL shape the
/// worker actually minted.
fn base_url(presigned: &str) -> Option<String> {
    let mut url = Url::parse(presigned).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

async fn deliver(kind: MediaKind, envelope: Envelope, deps: GatewayDeps, mut scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(kind, &envelope, &deps).await;
    if result.is_ok() {
        scratch.cleanup_correlation_start_time = true;
    }
    (result, scratch)
}

async fn run(kind: MediaKind, envelope: &Envelope, deps: &GatewayDeps) -> Result<Value, ControlError> {
    let payload = envelope.payload.as_object().ok_or_else(|| ControlError::MalformedEnvelope("ready payload not an object".into()))?;

    let presigned_url = payload.get("presigned_url").and_then(Value::as_str).unwrap_or_default();
    let message_id = payload.get("message_id").and_then(Value::as_str).unwrap_or_default();
    let chat_id = payload.get("chat_id").and_then(Value::as_str).unwrap_or_default();

    if presigned_url.is_empty() || message_id.is_empty() || chat_id.is_empty() {
        tracing::error!(correlation_id = %envelope.correlation_id, "malformed ready payload, aborting");
        return Ok(json!(null));
    }

    let base = base_url(presigned_url).ok_or_else(|| ControlError::MalformedEnvelope("unparseable presigned_url".into()))?;
    let object_hash = control_core::staging::content_hash(&base);

    let content_key = format!("{kind}_content:{object_hash}");
    if let Some(cached_id) = deps.cache.get(&content_key).await? {
        return deliver_cached(kind, deps, envelope, chat_id, message_id, &object_hash, &cached_id).await;
    }

    if !deps.interest_lock.try_acquire(kind.as_str(), &object_hash).await? {
        let backoff = coalesce_backoff();
        tracing::info!(kind = %kind, hash = %object_hash, delay_secs = backoff.as_secs_f64(), "lock held, deferring ready event");
        let deps = deps.clone();
        let body = envelope.to_wire()?;
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            if let Err(e) = deps.broker.publish(control_core::queues::GATEWAY_EVENTS, &body).await {
                tracing::error!(error = %e, "failed to re-publish coalesced ready event");
            }
        });
        return Ok(json!({ "deferred": true }));
    }

    let downloaded = download_if_absent(deps, &object_hash, presigned_url).await;
    if let Err(e) = downloaded {
        deps.interest_lock.release(kind.as_str(), &object_hash).await?;
        return Err(e);
    }

    let initial_caption = format!("🚀 **Downloading**\nID: `{}`", envelope.correlation_id);
    let file_path = deps.downloads_dir.join(&object_hash);
    let send_result = match kind {
        MediaKind::Video => deps.chat.send_video(chat_id, &file_path.display().to_string(), &initial_caption, Some(message_id)).await,
        MediaKind::Audio => deps.chat.send_audio(chat_id, &file_path.display().to_string(), &initial_caption, Some(message_id)).await,
    };
    let sent = send_result.map_err(|e| ControlError::ChatApiError(e.to_string()))?;

    let elapsed = elapsed_human(deps, &envelope.correlation_id).await?;
    let final_caption = format!("🚀 **Download Complete**\nTook: __{elapsed}__\nID: `{}`", envelope.correlation_id);
    deps.chat
        .edit_caption(chat_id, &sent.message_id, &final_caption)
        .await
        .map_err(|e| ControlError::ChatApiError(e.to_string()))?;

    if let Some(file_id) = &sent.file_id {
        deps.cache.set(&content_key, file_id, Some(control_core::staging::CONTENT_ID_TTL)).await?;
    } else {
        tracing::error!("no file id present in chat response after upload");
    }

    deps.interest_lock.release(kind.as_str(), &object_hash).await?;
    cleanup_optimistic_reply(deps.cache.as_ref(), deps.chat.as_ref(), &envelope.correlation_id).await?;

    Ok(json!({ "sent_message_id": sent.message_id }))
}

async fn deliver_cached(
    kind: MediaKind,
    deps: &GatewayDeps,
    envelope: &Envelope,
    chat_id: &str,
    message_id: &str,
    object_hash: &str,
    cached_id: &str,
) -> Result<Value, ControlError> {
    let elapsed = elapsed_human(deps, &envelope.correlation_id).await?;
    let caption = format!("**Download Complete**\nTook: __{elapsed}__\nID: `{}`", envelope.correlation_id);

    let send_result = match kind {
        MediaKind::Video => deps.chat.send_video(chat_id, cached_id, &caption, Some(message_id)).await,
        MediaKind::Audio => deps.chat.send_audio(chat_id, cached_id, &caption, Some(message_id)).await,
    };
    let sent = send_result.map_err(|e| ControlError::ChatApiError(e.to_string()))?;

    deps.interest_lock.release(kind.as_str(), object_hash).await?;
    cleanup_optimistic_reply(deps.cache.as_ref(), deps.chat.as_ref(), &envelope.correlation_id).await?;

    Ok(json!({ "sent_message_id": sent.message_id, "cached": true }))
}

async fn download_if_absent(deps: &GatewayDeps, object_hash: &str, presigned_url: &str) -> Result<(), ControlError> {
    let path = deps.downloads_dir.join(object_hash);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tracing::info!(path = %path.display(), "file already exists, skipping fetch");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(ControlError::Io)?;
    }

    let response = tokio::time::timeout(Duration::from_secs(120), reqwest::get(presigned_url))
        .await
        .map_err(|_| ControlError::Transport("presigned download timed out".into()))?
        .map_err(|e| ControlError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ControlError::ObjectNotFound(presigned_url.to_string()));
    }

    let bytes = response.bytes().await.map_err(|e| ControlError::Transport(e.to_string()))?;
    tokio::fs::write(&path, &bytes).await.map_err(ControlError::Io)?;
    Ok(())
}

async fn elapsed_human(deps: &GatewayDeps, correlation_id: &str) -> Result<String, ControlError> {
    let start_raw = deps.cache.hget(&format!("correlation_id:{correlation_id}"), "start_time").await?;
    let start: f64 = start_raw.and_then(|v| v.parse().ok()).unwrap_or_else(now_unix);
    let elapsed = (now_unix() - start).max(0.0);
    Ok(if elapsed < 1.0 {
        format!("{:.2} ms", elapsed * 1000.0)
    } else {
        format!("{elapsed:.3} s")
    })
}

fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_secs_f64()
}
