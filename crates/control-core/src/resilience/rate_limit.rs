//! Fixed-window rate limiter, keyed `rate_limit:{user_id}:{window_start}`.
//!
//! The algorithm is the exact fixed-window INCR+EXPIRE scheme from
//! `media-pirate/src/core/rate_limiter.py`: neither of the teacher's two
//! rate limiters implements this (one is token-bucket via `governor`, the
//! other sliding-window via a Lua script), so the algorithm is grounded on
//! the original source directly while the config/builder shape follows the
//! teacher's `RedisRateLimiterConfig`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::Cache;
use crate::error::ControlError;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests: 5,
        }
    }
}

pub struct FixedWindowRateLimiter {
    cache: Arc<dyn Cache>,
    config: RateLimitConfig,
}

impl FixedWindowRateLimiter {
    pub fn new(cache: Arc<dyn Cache>, config: RateLimitConfig) -> Self {
        FixedWindowRateLimiter { cache, config }
    }

    fn window_start(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        let window_secs = self.config.window.as_secs().max(1);
        (now / window_secs) * window_secs
    }

    fn key(&self, user_id: i64) -> String {
        format!("rate_limit:{user_id}:{}", self.window_start())
    }

    /// Non-mutating check: is the caller still under quota for the current
    /// window? Deliberately separate from `increment` so that callers can
    /// decide whether a request is "meaningful" enough to charge.
    pub async fn is_allowed(&self, user_id: i64) -> Result<bool, ControlError> {
        let key = self.key(user_id);
        let current = self
            .cache
            .get(&key)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(current < self.config.max_requests)
    }

    /// Atomically increments the window counter, attaching a TTL equal to
    /// the window length the first time the key is created. Returns the new
    /// count.
    pub async fn increment(&self, user_id: i64) -> Result<i64, ControlError> {
        let key = self.key(user_id);
        let count = self.cache.increment(&key).await?;
        if count == 1 {
            self.cache.expire(&key, self.config.window).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn limiter(max: i64) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(
            Arc::new(MemoryCache::new()),
            RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: max,
            },
        )
    }

    #[tokio::test]
    async fn allows_up_to_max_then_blocks() {
        let limiter = limiter(5);
        for _ in 0..5 {
            assert!(limiter.is_allowed(1).await.unwrap());
            limiter.increment(1).await.unwrap();
        }
        assert!(!limiter.is_allowed(1).await.unwrap());
    }

    #[tokio::test]
    async fn is_allowed_does_not_mutate() {
        let limiter = limiter(5);
        for _ in 0..10 {
            assert!(limiter.is_allowed(1).await.unwrap());
        }
    }

    #[tokio::test]
    async fn separate_users_have_separate_budgets() {
        let limiter = limiter(1);
        limiter.increment(1).await.unwrap();
        assert!(!limiter.is_allowed(1).await.unwrap());
        assert!(limiter.is_allowed(2).await.unwrap());
    }

    #[tokio::test]
    async fn increment_returns_running_count() {
        let limiter = limiter(100);
        assert_eq!(limiter.increment(1).await.unwrap(), 1);
        assert_eq!(limiter.increment(1).await.unwrap(), 2);
    }
}
