//! The external collaborators the distilled spec places out of scope (chat
//! client SDK, AMQP client, object-store client) are still things gateway
//! handlers call — so we specify them as narrow traits at the boundary, the
//! same seam the teacher draws around `cache::Cache` and `Provider<T>`.
//! Production wiring lives in `adapters`; tests substitute hand-written
//! fakes against these traits.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat API call failed: {0}")]
    Api(String),
}

/// A sent or edited chat message, as much as handlers need back.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message_id: String,
    pub file_id: Option<String>,
}

/// The bounded surface of the chat platform a handler may need. Real
/// messages are far richer; `NormalizedMessage` (see `ingress.rs`) is the
/// well-typed flattening this trait's `send_message` et al. round-trip
/// against.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str, reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError>;

    async fn send_video(&self, chat_id: &str, path_or_file_id: &str, caption: &str, reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError>;

    async fn send_audio(&self, chat_id: &str, path_or_file_id: &str, caption: &str, reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError>;

    async fn edit_caption(&self, chat_id: &str, message_id: &str, caption: &str) -> Result<(), ChatError>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), ChatError>;

    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<(), ChatError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker channel closed")]
    ChannelClosed,
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Publishes an already-encoded envelope onto a named queue. Reconnection on
/// a closed channel is the adapter's concern (§5); handlers only ever see
/// `BrokerError::ChannelClosed` if a retry still failed.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found")]
    NotFound,
    #[error("object store call failed: {0}")]
    Backend(String),
}

/// The bucket operations the staging protocol needs: existence check,
/// upload with metadata, and presigned-GET minting.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn stat(&self, key: &str) -> Result<(), ObjectStoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: Vec<(&'static str, String)>) -> Result<(), ObjectStoreError>;

    async fn presign_get(&self, key: &str, ttl: std::time::Duration, content_type: &str, filename: &str) -> Result<String, ObjectStoreError>;
}

/// Flattens whatever the chat SDK handed us into the bounded, documented
/// shape every handler actually consumes — the typed replacement for
/// reflection-based serialization (§9).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NormalizedMessage {
    pub message_id: String,
    pub chat_id: String,
    pub text: String,
    pub filtered_parts: Vec<String>,
    pub from_user_id: Option<i64>,
    pub from_user_name: String,
    pub reply_to_message_id: Option<String>,
    pub reply_text: String,
    pub reply_user_id: Option<String>,
    pub reply_user_name: Option<String>,
}

impl NormalizedMessage {
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).expect("NormalizedMessage always serializes")
    }
}
