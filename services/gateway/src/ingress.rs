//! §4.7 — the gateway's ingress path. Called directly from the chat-client
//! event loop in `main.rs` for every inbound message; not a router route,
//! since there is no envelope yet to dispatch against.

use std::time::{SystemTime, UNIX_EPOCH};

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::queues::{GATEWAY_EVENTS, TELEGRAM_EVENTS};

use crate::deps::GatewayDeps;
use crate::ports::NormalizedMessage;

pub async fn handle_incoming_message(deps: &GatewayDeps, message: NormalizedMessage) -> Result<(), ControlError> {
    let Some(user_id) = message.from_user_id else {
        tracing::warn!("message with no from_user_id, dropping");
        return Ok(());
    };
    let chat_id: i64 = message.chat_id.parse().map_err(|_| ControlError::MalformedEnvelope("chat_id not numeric".into()))?;

    if !deps.authenticator.is_allowed(user_id, chat_id).await? {
        tracing::info!(user_id, chat_id, "authentication denied, dropping message");
        return Ok(());
    }

    let is_rate_limited = !deps.rate_limiter.is_allowed(user_id).await?;

    let envelope = Envelope::create_with(
        "events.telegram.raw",
        message.to_payload(),
        1,
        None,
        is_rate_limited,
    )?;

    let start_time = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_secs_f64();
    deps.cache
        .hset(&format!("correlation_id:{}", envelope.correlation_id), "start_time", &start_time.to_string())
        .await?;

    let body = envelope.to_wire()?;
    deps.broker
        .publish(TELEGRAM_EVENTS, &body)
        .await
        .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;

    if deps.authenticator.is_admin(user_id) {
        deps.broker
            .publish(GATEWAY_EVENTS, &body)
            .await
            .map_err(|e| ControlError::BrokerChannelClosed(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BrokerError, ChatClient, ChatError, ObjectStore, ObjectStoreError, SentMessage};
    use async_trait::async_trait;
    use control_core::auth::ChatAuthenticator;
    use control_core::cache::MemoryCache;
    use control_core::resilience::{FixedWindowRateLimiter, InterestLock, RateLimitConfig};
    use std::sync::Mutex;
    use std::sync::Arc;

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

    struct NoopChat;

    #[async_trait]
    impl ChatClient for NoopChat {
        async fn send_message(&self, _c: &str, _t: &str, _r: Option<&str>) -> Result<SentMessage, ChatError> {
            unimplemented!()
        }
        async fn send_video(&self, _c: &str, _p: &str, _cap: &str, _r: Option<&str>) -> Result<SentMessage, ChatError> {
            unimplemented!()
        }
        async fn send_audio(&self, _c: &str, _p: &str, _cap: &str, _r: Option<&str>) -> Result<SentMessage, ChatError> {
            unimplemented!()
        }
        async fn edit_caption(&self, _c: &str, _m: &str, _cap: &str) -> Result<(), ChatError> {
            unimplemented!()
        }
        async fn delete_message(&self, _c: &str, _m: &str) -> Result<(), ChatError> {
            unimplemented!()
        }
        async fn react(&self, _c: &str, _m: &str, _e: &str) -> Result<(), ChatError> {
            unimplemented!()
        }
    }

    struct NoopObjectStore;

    #[async_trait]
    impl ObjectStore for NoopObjectStore {
        async fn stat(&self, _key: &str) -> Result<(), ObjectStoreError> {
            unimplemented!()
        }
        async fn put(&self, _key: &str, _bytes: Vec<u8>, _metadata: Vec<(&'static str, String)>) -> Result<(), ObjectStoreError> {
            unimplemented!()
        }
        async fn presign_get(&self, _key: &str, _ttl: std::time::Duration, _content_type: &str, _filename: &str) -> Result<String, ObjectStoreError> {
            unimplemented!()
        }
    }

    fn deps(broker: Arc<RecordingBroker>, admin: i64) -> GatewayDeps {
        let cache: Arc<dyn control_core::cache::Cache> = Arc::new(MemoryCache::new());
        GatewayDeps {
            cache: cache.clone(),
            rate_limiter: Arc::new(FixedWindowRateLimiter::new(cache.clone(), RateLimitConfig::default())),
            interest_lock: Arc::new(InterestLock::new(cache.clone())),
            authenticator: Arc::new(ChatAuthenticator::new(cache, admin)),
            broker,
            object_store: Arc::new(NoopObjectStore),
            chat: Arc::new(NoopChat),
            downloads_dir: std::path::PathBuf::from("./downloads"),
        }
    }

    fn message(user_id: i64, chat_id: i64) -> NormalizedMessage {
        NormalizedMessage {
            message_id: "1".into(),
            chat_id: chat_id.to_string(),
            text: ".vdl https://host/path".into(),
            filtered_parts: vec![".vdl".into(), "https://host/path".into()],
            from_user_id: Some(user_id),
            from_user_name: "alice".into(),
            reply_to_message_id: None,
            reply_text: String::new(),
            reply_user_id: None,
            reply_user_name: None,
        }
    }

    #[tokio::test]
    async fn admin_message_publishes_to_both_queues() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone(), 42);
        handle_incoming_message(&deps, message(42, 999)).await.unwrap();

        let published = broker.published.lock().unwrap();
        let queues: Vec<_> = published.iter().map(|(q, _)| q.clone()).collect();
        assert_eq!(queues, vec![TELEGRAM_EVENTS.to_string(), GATEWAY_EVENTS.to_string()]);
    }

    #[tokio::test]
    async fn non_admin_without_grant_is_dropped() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone(), 42);
        handle_incoming_message(&deps, message(7, 999)).await.unwrap();
        assert!(broker.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn graced_non_admin_publishes_only_to_telegram_events() {
        let broker = Arc::new(RecordingBroker { published: Mutex::new(Vec::new()) });
        let deps = deps(broker.clone(), 42);
        deps.authenticator.grace(999).await.unwrap();

        handle_incoming_message(&deps, message(7, 999)).await.unwrap();

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, TELEGRAM_EVENTS);
    }
}
