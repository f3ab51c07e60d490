//! §4.10 — delete the eager "processing…" reply once real media has been
//! delivered. Safe to call when no optimistic reply was ever recorded.

use control_core::cache::Cache;
use control_core::error::ControlError;

use crate::ports::ChatClient;

pub async fn cleanup_optimistic_reply(
    cache: &dyn Cache,
    chat: &dyn ChatClient,
    correlation_id: &str,
) -> Result<(), ControlError> {
    let key = format!("correlation_id:{correlation_id}:optimistic_reply");

    let message_id = cache.hget(&key, "message_id").await?;
    let chat_id = cache.hget(&key, "chat_id").await?;

    let (Some(message_id), Some(chat_id)) = (message_id, chat_id) else {
        return Ok(());
    };

    if let Err(e) = chat.delete_message(&chat_id, &message_id).await {
        tracing::warn!(error = %e, correlation_id, "failed to delete optimistic reply");
    }

    cache.hdel(&key, &["message_id", "chat_id"]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChatError, SentMessage};
    use async_trait::async_trait;
    use control_core::cache::MemoryCache;
    use std::sync::Mutex;

    struct RecordingChat {
        deleted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn send_message(&self, _chat_id: &str, _text: &str, _reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError> {
            unimplemented!()
        }
        async fn send_video(&self, _chat_id: &str, _p: &str, _c: &str, _r: Option<&str>) -> Result<SentMessage, ChatError> {
            unimplemented!()
        }
        async fn send_audio(&self, _chat_id: &str, _p: &str, _c: &str, _r: Option<&str>) -> Result<SentMessage, ChatError> {
            unimplemented!()
        }
        async fn edit_caption(&self, _chat_id: &str, _message_id: &str, _caption: &str) -> Result<(), ChatError> {
            unimplemented!()
        }
        async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), ChatError> {
            self.deleted.lock().unwrap().push((chat_id.to_string(), message_id.to_string()));
            Ok(())
        }
        async fn react(&self, _chat_id: &str, _message_id: &str, _emoji: &str) -> Result<(), ChatError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn no_op_when_nothing_recorded() {
        let cache = MemoryCache::new();
        let chat = RecordingChat { deleted: Mutex::new(Vec::new()) };
        cleanup_optimistic_reply(&cache, &chat, "corr-1").await.unwrap();
        assert!(chat.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deletes_and_clears_recorded_reply() {
        let cache = MemoryCache::new();
        cache.hset("correlation_id:corr-1:optimistic_reply", "message_id", "42").await.unwrap();
        cache.hset("correlation_id:corr-1:optimistic_reply", "chat_id", "7").await.unwrap();

        let chat = RecordingChat { deleted: Mutex::new(Vec::new()) };
        cleanup_optimistic_reply(&cache, &chat, "corr-1").await.unwrap();

        assert_eq!(chat.deleted.lock().unwrap().as_slice(), &[("7".to_string(), "42".to_string())]);
        assert!(cache.hget("correlation_id:corr-1:optimistic_reply", "message_id").await.unwrap().is_none());
    }
}
