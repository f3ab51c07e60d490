//! `commands.media.video_download` / `commands.media.audio_download` v1 —
//! grounded on `original_source/media-pirate/src/handlers/dl_command.py`'s
//! URL-resolution/stat/download/upload/presign sequence.

use control_core::cache::Cache;
use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::queues::GATEWAY_EVENTS;
use control_core::router::Scratch;
use control_core::staging::{self, MediaKind, ObjectMetadata};
use serde_json::{json, Value};

use crate::deps::WorkerDeps;
use crate::ports::DownloadError;

const UNSUPPORTED_SOURCE_TEXT: &str = "Unsupported source";

pub async fn video_download_handler(envelope: Envelope, deps: WorkerDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(MediaKind::Video, &envelope, &deps).await;
    (result, scratch)
}

pub async fn audio_download_handler(envelope: Envelope, deps: WorkerDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let result = run(MediaKind::Audio, &envelope, &deps).await;
    (result, scratch)
}

fn extract_url(candidate: Option<&str>) -> Option<String> {
    let candidate = candidate?.trim();
    (candidate.starts_with("http://") || candidate.starts_with("https://")).then(|| candidate.to_string())
}

fn resolve_url(payload: &serde_json::Map<String, Value>) -> Option<String> {
    let from_text = payload
        .get("filtered_parts")
        .and_then(Value::as_array)
        .and_then(|parts| parts.get(1))
        .and_then(Value::as_str);
    let from_reply = payload.get("reply_text").and_then(Value::as_str);

    extract_url(from_text).or_else(|| extract_url(from_reply))
}

async fn run(kind: MediaKind, envelope: &Envelope, deps: &WorkerDeps) -> Result<Value, ControlError> {
    let payload = envelope.payload.as_object().ok_or_else(|| ControlError::MalformedEnvelope("command payload not an object".into()))?;

    let message_id = payload.get("message_id").and_then(Value::as_str).unwrap_or_default().to_string();
    let chat_id = payload.get("chat_id").and_then(Value::as_str).unwrap_or_default().to_string();

    let Some(url) = resolve_url(payload) else {
        tracing::error!(correlation_id = %envelope.correlation_id, "no valid URL in command or reply");
        return mark_unsupported(envelope, deps).await;
    };

    let Some(normalized) = staging::normalize_url(&url) else {
        tracing::error!(correlation_id = %envelope.correlation_id, url, "unparseable URL");
        return mark_unsupported(envelope, deps).await;
    };
    let object_key = staging::object_key(kind, &normalized);

    match deps.object_store.stat(&object_key).await {
        Ok(content_type) => {
            tracing::info!(object_key, "object already staged, skipping download");
            let content_type = content_type.unwrap_or_else(|| default_content_type(kind).to_string());
            return emit_ready(kind, envelope, deps, &object_key, &message_id, &chat_id, &content_type).await;
        }
        Err(crate::ports::ObjectStoreError::NotFound) => {}
        Err(e) => return Err(ControlError::ObjectNotFound(e.to_string())),
    }

    let downloaded = match kind {
        MediaKind::Video => deps.downloader.download_video(&url).await,
        MediaKind::Audio => deps.downloader.download_audio(&url).await,
    };
    let downloaded = match downloaded {
        Ok(file) => file,
        Err(DownloadError::Unsupported) => {
            tracing::info!(correlation_id = %envelope.correlation_id, url, "source not supported by downloader");
            return mark_unsupported(envelope, deps).await;
        }
        Err(DownloadError::Failed(msg)) => return Err(ControlError::Transport(msg)),
    };

    let bytes = tokio::fs::read(&downloaded.path).await.map_err(ControlError::Io)?;
    let domain = url::Url::parse(&normalized).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();
    let metadata = ObjectMetadata {
        extension: downloaded.extension.clone(),
        original_name: downloaded.original_name.clone(),
        source_url_hash: staging::content_hash(&normalized),
        download_timestamp: chrono::Utc::now().to_rfc3339(),
        original_url: url.clone(),
        cleaned_url: normalized.clone(),
        url_domain: domain,
    };

    deps.object_store
        .put(&object_key, bytes, &downloaded.content_type, metadata.to_header_map())
        .await
        .map_err(|e| ControlError::Transport(e.to_string()))?;

    if let Err(e) = tokio::fs::remove_file(&downloaded.path).await {
        tracing::warn!(error = %e, "failed to clean up temp file");
    }

    emit_ready(kind, envelope, deps, &object_key, &message_id, &chat_id, &downloaded.content_type).await
}

fn default_content_type(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "video/mp4",
        MediaKind::Audio => "audio/mpeg",
    }
}

/// Source the downloader can't handle: rewrite the optimistic-reply message
/// in place to say so, mirroring `download_error_message_dispatcher`'s
/// lookup of the `correlation_id:{id}:optimistic_reply` hash, and report the
/// command as handled rather than failed — there's nothing to retry.
async fn mark_unsupported(envelope: &Envelope, deps: &WorkerDeps) -> Result<Value, ControlError> {
    let key = format!("correlation_id:{}:optimistic_reply", envelope.correlation_id);
    let message_id = deps.cache.hget(&key, "message_id").await?;
    let chat_id = deps.cache.hget(&key, "chat_id").await?;

    let (Some(message_id), Some(chat_id)) = (message_id, chat_id) else {
        return Ok(json!({ "unsupported": true }));
    };

    let update = envelope.derive(
        "commands.gateway.message-update",
        json!({ "chat_id": chat_id, "message_id": message_id, "text": UNSUPPORTED_SOURCE_TEXT }),
    )?;
    deps.broker
        .publish(GATEWAY_EVENTS, &update.to_wire()?)
        .await
        .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;

    Ok(json!({ "unsupported": true }))
}

async fn emit_ready(kind: MediaKind, envelope: &Envelope, deps: &WorkerDeps, object_key: &str, message_id: &str, chat_id: &str, content_type: &str) -> Result<Value, ControlError> {
    let filename = format!("{object_key}.{}", kind.as_str());
    let presigned_url = deps
        .object_store
        .presign_get(object_key, staging::PRESIGN_TTL, content_type, &filename)
        .await
        .map_err(|e| ControlError::Transport(e.to_string()))?;

    let ready_type = match kind {
        MediaKind::Video => "events.dl.video.ready",
        MediaKind::Audio => "events.dl.audio.ready",
    };
    let ready = envelope.derive(ready_type, json!({ "presigned_url": presigned_url, "message_id": message_id, "chat_id": chat_id }))?;
    deps.broker
        .publish(GATEWAY_EVENTS, &ready.to_wire()?)
        .await
        .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;

    Ok(json!({ "presigned_url": presigned_url }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BrokerError, ObjectStoreError};
    use async_trait::async_trait;
    use control_core::cache::MemoryCache;
    use control_core::resilience::{FixedWindowRateLimiter, RateLimitConfig};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

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

    struct StubObjectStore {
        already_staged: bool,
    }

    #[async_trait]
    impl crate::ports::ObjectStore for StubObjectStore {
        async fn stat(&self, _key: &str) -> Result<Option<String>, ObjectStoreError> {
            if self.already_staged {
                Ok(Some("video/mp4".to_string()))
            } else {
                Err(ObjectStoreError::NotFound)
            }
        }
        async fn put(&self, _key: &str, _bytes: Vec<u8>, _content_type: &str, _metadata: Vec<(&'static str, String)>) -> Result<(), ObjectStoreError> {
            Ok(())
        }
        async fn presign_get(&self, key: &str, _ttl: Duration, _content_type: &str, _filename: &str) -> Result<String, ObjectStoreError> {
            Ok(format!("https://bucket.example/{key}?sig=abc"))
        }
    }

    struct UnsupportedDownloader;

    #[async_trait]
    impl crate::ports::MediaDownloader for UnsupportedDownloader {
        async fn download_video(&self, _url: &str) -> Result<crate::ports::DownloadedFile, DownloadError> {
            Err(DownloadError::Unsupported)
        }
        async fn download_audio(&self, _url: &str) -> Result<crate::ports::DownloadedFile, DownloadError> {
            Err(DownloadError::Unsupported)
        }
    }

    fn deps(broker: Arc<RecordingBroker>, object_store: Arc<dyn crate::ports::ObjectStore>) -> WorkerDeps {
        let cache: Arc<dyn control_core::cache::Cache> = Arc::new(MemoryCache::new());
        WorkerDeps {
            cache,
            rate_limiter: Arc::new(FixedWindowRateLimiter::new(Arc::new(MemoryCache::new()), RateLimitConfig::default())),
            broker,
            object_store,
            downloader: Arc::new(UnsupportedDownloader),
            downloads_dir: std::path::PathBuf::from("./downloads"),
        }
    }

    #[tokio::test]
    async fn unsupported_url_rewrites_optimistic_reply_when_recorded() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone(), Arc::new(StubObjectStore { already_staged: false }));

        let envelope = Envelope::create("commands.media.video_download", json!({ "chat_id": "7", "message_id": "42", "filtered_parts": [".vdl", "not a url"] })).unwrap();
        deps.cache.hset(&format!("correlation_id:{}:optimistic_reply", envelope.correlation_id), "message_id", "42").await.unwrap();
        deps.cache.hset(&format!("correlation_id:{}:optimistic_reply", envelope.correlation_id), "chat_id", "7").await.unwrap();

        let result = run(MediaKind::Video, &envelope, &deps).await.unwrap();
        assert_eq!(result, json!({ "unsupported": true }));

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, GATEWAY_EVENTS);
    }

    #[tokio::test]
    async fn unsupported_url_is_a_no_op_without_recorded_reply() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone(), Arc::new(StubObjectStore { already_staged: false }));
        let envelope = Envelope::create("commands.media.video_download", json!({ "chat_id": "7", "message_id": "42", "filtered_parts": [".vdl"] })).unwrap();

        let result = run(MediaKind::Video, &envelope, &deps).await.unwrap();
        assert_eq!(result, json!({ "unsupported": true }));
        assert!(broker.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn already_staged_object_skips_download_and_emits_ready() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone(), Arc::new(StubObjectStore { already_staged: true }));
        let envelope = Envelope::create(
            "commands.media.video_download",
            json!({ "chat_id": "7", "message_id": "42", "filtered_parts": [".vdl", "https://example.com/clip"] }),
        )
        .unwrap();

        let result = run(MediaKind::Video, &envelope, &deps).await.unwrap();
        assert!(result.get("presigned_url").is_some());

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, GATEWAY_EVENTS);
    }

    #[test]
    fn resolve_url_prefers_command_argument_over_reply_text() {
        let payload = json!({ "filtered_parts": [".vdl", "https://a.example/x"], "reply_text": "https://b.example/y" });
        let payload = payload.as_object().unwrap();
        assert_eq!(resolve_url(payload), Some("https://a.example/x".to_string()));
    }

    #[test]
    fn resolve_url_falls_back_to_reply_text() {
        let payload = json!({ "filtered_parts": [".vdl"], "reply_text": "https://b.example/y" });
        let payload = payload.as_object().unwrap();
        assert_eq!(resolve_url(payload), Some("https://b.example/y".to_string()));
    }

    #[test]
    fn resolve_url_rejects_non_http_text() {
        let payload = json!({ "filtered_parts": [".vdl", "not a url"], "reply_text": "" });
        let payload = payload.as_object().unwrap();
        assert_eq!(resolve_url(payload), None);
    }
}
