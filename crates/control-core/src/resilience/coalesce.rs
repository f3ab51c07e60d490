//! Interest-accumulator lock: serializes concurrent handlers racing to
//! build the same content-addressable artifact.
//!
//! Grounded on §4.8/§4.10's NX-lock + re-publish description; the object
//! bucket/content-id lookup it protects comes from
//! `gateway/src/handlers/video_ready_event.py`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::cache::Cache;
use crate::error::ControlError;

const LOCK_TTL: Duration = Duration::from_secs(500);
const LOCK_VALUE: &str = "1";

pub struct InterestLock {
    cache: Arc<dyn Cache>,
}

impl InterestLock {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        InterestLock { cache }
    }

    fn key(kind: &str, hash: &str) -> String {
        format!("ongoing_{kind}_content:{hash}")
    }

    /// Attempt to become the single builder for `(kind, hash)`. Returns
    /// `true` iff this call acquired the lock.
    pub async fn try_acquire(&self, kind: &str, hash: &str) -> Result<bool, ControlError> {
        let key = Self::key(kind, hash);
        Ok(self.cache.set_nx(&key, LOCK_VALUE, LOCK_TTL).await?)
    }

    pub async fn release(&self, kind: &str, hash: &str) -> Result<(), ControlError> {
        let key = Self::key(kind, hash);
        self.cache.delete(&key).await?;
        Ok(())
    }
}

/// `2 + jitter[0, 1)` seconds, the backoff a contender sleeps before
/// re-publishing a ready event it couldn't claim the lock for.
pub fn coalesce_backoff() -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_secs_f64(2.0 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn only_one_acquires() {
        let lock = InterestLock::new(Arc::new(MemoryCache::new()));
        assert!(lock.try_acquire("video", "h1").await.unwrap());
        assert!(!lock.try_acquire("video", "h1").await.unwrap());
    }

    #[tokio::test]
    async fn release_allows_reacquire() {
        let lock = InterestLock::new(Arc::new(MemoryCache::new()));
        assert!(lock.try_acquire("video", "h1").await.unwrap());
        lock.release("video", "h1").await.unwrap();
        assert!(lock.try_acquire("video", "h1").await.unwrap());
    }

    #[test]
    fn backoff_is_within_expected_bounds() {
        for _ in 0..50 {
            let d = coalesce_backoff();
            assert!(d >= Duration::from_secs_f64(2.0));
            assert!(d < Duration::from_secs_f64(3.0));
        }
    }
}
