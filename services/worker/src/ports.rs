//! External collaborators the distilled spec places out of scope (the AMQP
//! client, the object-store client, the media-download tool) as narrow
//! traits at the boundary — the same seam `services/gateway/src/ports.rs`
//! draws, and the teacher's `cache::Cache`/`Provider<T>` before it.

use std::path::PathBuf;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker channel closed")]
    ChannelClosed,
    #[error("publish failed: {0}")]
    Publish(String),
}

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

/// `stat` returns the object's stored content-type on a hit — the worker
/// needs it to mint a presigned GET for an already-staged object without
/// re-deriving it from the kind.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn stat(&self, key: &str) -> Result<Option<String>, ObjectStoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str, metadata: Vec<(&'static str, String)>) -> Result<(), ObjectStoreError>;

    async fn presign_get(&self, key: &str, ttl: std::time::Duration, content_type: &str, filename: &str) -> Result<String, ObjectStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("source not supported")]
    Unsupported,
    #[error("download failed: {0}")]
    Failed(String),
}

/// What `yt-dlp` (or whatever tool backs it) handed back: a local file plus
/// enough metadata to populate the object bucket's user-metadata fields.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub extension: String,
    pub original_name: String,
    pub content_type: String,
}

/// The bounded surface of the media-download tool a handler needs.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download_video(&self, url: &str) -> Result<DownloadedFile, DownloadError>;

    async fn download_audio(&self, url: &str) -> Result<DownloadedFile, DownloadError>;
}
