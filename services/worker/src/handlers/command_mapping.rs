//! `events.telegram.raw` v1 — command-token mapping, grounded on
//! `original_source/media-pirate/src/dispatchers/message_update_command.py`'s
//! token-to-event-derivation idiom (that file maps a different token set;
//! the shape is the same).
//!
//! `.vdl` → `commands.media.video_download`, `.adl` → `commands.media.
//! audio_download`. Unknown tokens are dropped. Enforces the rate limit
//! before mapping: over quota publishes a "too many requests" reply and
//! does not proceed; otherwise republishes the mapped command onto
//! `telegram_events` and sets `scratch.increase_rate_limit` for
//! `maybe_rate_limit_increment`.

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::queues::{GATEWAY_EVENTS, TELEGRAM_EVENTS};
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::WorkerDeps;

const TOO_MANY_REQUESTS: &str = "⏳ Too many requests. Please try again shortly.";

pub async fn command_mapping_handler(envelope: Envelope, deps: WorkerDeps, mut scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(&envelope, &deps, &mut scratch).await;
    (result, scratch)
}

async fn run(envelope: &Envelope, deps: &WorkerDeps, scratch: &mut Scratch) -> Result<Value, ControlError> {
    let payload = envelope.payload.as_object().ok_or_else(|| ControlError::MalformedEnvelope("raw payload not an object".into()))?;

    let token = payload
        .get("filtered_parts")
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mapped_type = match token {
        ".vdl" => "commands.media.video_download",
        ".adl" => "commands.media.audio_download",
        _ => return Ok(json!(null)),
    };

    let user_id = payload.get("from_user_id").and_then(Value::as_i64).ok_or_else(|| ControlError::MalformedEnvelope("missing from_user_id".into()))?;
    let chat_id = payload.get("chat_id").and_then(Value::as_str).unwrap_or_default();
    let message_id = payload.get("message_id").and_then(Value::as_str).unwrap_or_default();

    if !deps.rate_limiter.is_allowed(user_id).await? {
        let reply = envelope.derive(
            "commands.gateway.reply",
            json!({ "chat_id": chat_id, "text": TOO_MANY_REQUESTS, "reply_to_message_id": message_id }),
        )?;
        deps.broker
            .publish(GATEWAY_EVENTS, &reply.to_wire()?)
            .await
            .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;
        return Ok(json!({ "rate_limited": true }));
    }

    let derived = envelope.derive(mapped_type, envelope.payload.clone())?;
    deps.broker
        .publish(TELEGRAM_EVENTS, &derived.to_wire()?)
        .await
        .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;

    scratch.increase_rate_limit = true;
    scratch.extra.insert("rate_limit_user_id".to_string(), json!(user_id));
    scratch.extra.insert("rate_limit_chat_id".to_string(), json!(chat_id));
    scratch.extra.insert("rate_limit_message_id".to_string(), json!(message_id));

    Ok(json!({ "mapped_to": mapped_type }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BrokerError;
    use async_trait::async_trait;
    use control_core::cache::MemoryCache;
    use control_core::resilience::{FixedWindowRateLimiter, RateLimitConfig};
    use std::sync::{Arc, Mutex};

    struct RecordingBroker {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl crate::ports::BrokerPublisher for RecordingBroker {
        async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
            self.published.lock().unwrap().push((queue.to_string(), body.to_vec()));
            Ok(())
        }
    }

    struct UnreachableObjectStore;

    #[async_trait]
    impl crate::ports::ObjectStore for UnreachableObjectStore {
        async fn stat(&self, _key: &str) -> Result<Option<String>, crate::ports::ObjectStoreError> {
            unimplemented!()
        }
        async fn put(&self, _key: &str, _bytes: Vec<u8>, _content_type: &str, _metadata: Vec<(&'static str, String)>) -> Result<(), crate::ports::ObjectStoreError> {
            unimplemented!()
        }
        async fn presign_get(&self, _key: &str, _ttl: std::time::Duration, _content_type: &str, _filename: &str) -> Result<String, crate::ports::ObjectStoreError> {
            unimplemented!()
        }
    }

    struct UnreachableDownloader;

    #[async_trait]
    impl crate::ports::MediaDownloader for UnreachableDownloader {
        async fn download_video(&self, _url: &str) -> Result<crate::ports::DownloadedFile, crate::ports::DownloadError> {
            unimplemented!()
        }
        async fn download_audio(&self, _url: &str) -> Result<crate::ports::DownloadedFile, crate::ports::DownloadError> {
            unimplemented!()
        }
    }

    fn deps(broker: Arc<RecordingBroker>) -> WorkerDeps {
        let cache: Arc<dyn control_core::cache::Cache> = Arc::new(MemoryCache::new());
        WorkerDeps {
            cache: cache.clone(),
            rate_limiter: Arc::new(FixedWindowRateLimiter::new(cache, RateLimitConfig::default())),
            broker,
            object_store: Arc::new(UnreachableObjectStore),
            downloader: Arc::new(UnreachableDownloader),
            downloads_dir: std::path::PathBuf::from("./downloads"),
        }
    }

    fn raw_envelope(token: &str, user_id: i64) -> Envelope {
        Envelope::create(
            "events.telegram.raw",
            json!({ "chat_id": "7", "message_id": "42", "from_user_id": user_id, "filtered_parts": [token, "https://example.com/clip"] }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_token_is_a_no_op() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone());
        let mut scratch = Scratch::default();

        let result = run(&raw_envelope(".unknown", 1), &deps, &mut scratch).await.unwrap();
        assert_eq!(result, json!(null));
        assert!(broker.published.lock().unwrap().is_empty());
        assert!(!scratch.increase_rate_limit);
    }

    #[tokio::test]
    async fn vdl_maps_to_video_download_and_flags_rate_limit() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone());
        let mut scratch = Scratch::default();

        let result = run(&raw_envelope(".vdl", 1), &deps, &mut scratch).await.unwrap();
        assert_eq!(result, json!({ "mapped_to": "commands.media.video_download" }));

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, TELEGRAM_EVENTS);
        assert!(scratch.increase_rate_limit);
        assert_eq!(scratch.extra.get("rate_limit_user_id"), Some(&json!(1)));
    }
}
