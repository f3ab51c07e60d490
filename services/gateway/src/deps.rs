use std::sync::Arc;

use control_core::auth::ChatAuthenticator;
use control_core::cache::Cache;
use control_core::resilience::{FixedWindowRateLimiter, InterestLock};

use crate::ports::{BrokerPublisher, ChatClient, ObjectStore};

/// Everything a gateway handler or middleware may need, constructed once at
/// startup and cloned (cheaply, via `Arc`) into every dispatch call.
#[derive(Clone)]
pub struct GatewayDeps {
    pub cache: Arc<dyn Cache>,
    pub rate_limiter: Arc<FixedWindowRateLimiter>,
    pub interest_lock: Arc<InterestLock>,
    pub authenticator: Arc<ChatAuthenticator>,
    pub broker: Arc<dyn BrokerPublisher>,
    pub object_store: Arc<dyn ObjectStore>,
    pub chat: Arc<dyn ChatClient>,
    pub downloads_dir: std::path::PathBuf,
}
