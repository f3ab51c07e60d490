use std::path::PathBuf;
use std::sync::Arc;

use control_core::cache::Cache;
use control_core::resilience::FixedWindowRateLimiter;

use crate::ports::{BrokerPublisher, MediaDownloader, ObjectStore};

/// Everything a worker handler or middleware may need, constructed once at
/// startup and cloned (cheaply, via `Arc`) into every dispatch call.
#[derive(Clone)]
pub struct WorkerDeps {
    pub cache: Arc<dyn Cache>,
    pub rate_limiter: Arc<FixedWindowRateLimiter>,
    pub broker: Arc<dyn BrokerPublisher>,
    pub object_store: Arc<dyn ObjectStore>,
    pub downloader: Arc<dyn MediaDownloader>,
    pub downloads_dir: PathBuf,
}
