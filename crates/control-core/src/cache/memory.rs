//! In-process cache backend used for local development and tests.
//!
//! Adapted from the teacher's `cache::memory::MemoryCache`, extended with
//! the atomic `set_nx`/`increment`/`expire` primitives and a small hash-field
//! store, neither of which the teacher's string-only cache needed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::traits::{Cache, CacheError, CacheResult};

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

/// Thread-safe in-memory cache. Strings and hash fields share one map keyed
/// by `"{key}"` and `"{key}\u{0}{field}"` respectively — adequate for a
/// single-process dev/test backend where collisions across the two
/// namespaces are a non-concern.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn hash_field_key(key: &str, field: &str) -> String {
        format!("{key}\u{0}{field}")
    }

    fn read(&self, key: &str) -> Option<String> {
        let mut guard = self.entries.write().unwrap();
        match guard.get(key) {
            Some(entry) if entry.is_expired() => {
                guard.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    fn write(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.write().unwrap().insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
            },
        );
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<Option<String>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.read(&key)) })
    }

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            self.write(&key, value, ttl);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.entries.write().unwrap().remove(&key);
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.read(&key).is_some()) })
    }

    fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn std::future::Future<Output = CacheResult<bool>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut guard = self.entries.write().unwrap();
            let occupied = match guard.get(&key) {
                Some(entry) if !entry.is_expired() => true,
                _ => false,
            };
            if occupied {
                return Ok(false);
            }
            guard.insert(
                key,
                Entry {
                    value,
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(true)
        })
    }

    fn increment(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<i64>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut guard = self.entries.write().unwrap();
            let current = match guard.get(&key) {
                Some(entry) if !entry.is_expired() => entry
                    .value
                    .parse::<i64>()
                    .map_err(|e| CacheError::Backend(e.to_string()))?,
                _ => 0,
            };
            let next = current + 1;
            let expires_at = guard.get(&key).and_then(|e| e.expires_at);
            guard.insert(
                key,
                Entry {
                    value: next.to_string(),
                    expires_at,
                },
            );
            Ok(next)
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            if let Some(entry) = self.entries.write().unwrap().get_mut(&key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }

    fn hset(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let full_key = Self::hash_field_key(key, field);
        let value = value.to_string();
        Box::pin(async move {
            self.write(&full_key, value, None);
            Ok(())
        })
    }

    fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = CacheResult<Option<String>>> + Send + '_>> {
        let full_key = Self::hash_field_key(key, field);
        Box::pin(async move { Ok(self.read(&full_key)) })
    }

    fn hdel(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let full_keys: Vec<String> = fields.iter().map(|f| Self::hash_field_key(key, f)).collect();
        Box::pin(async move {
            let mut guard = self.entries.write().unwrap();
            for k in &full_keys {
                guard.remove(k);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_only_succeeds_once() {
        let cache = MemoryCache::new();
        assert!(cache.set_nx("lock", "1", Duration::from_secs(5)).await.unwrap());
        assert!(!cache.set_nx("lock", "1", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn increment_counts_up_from_zero() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("counter").await.unwrap(), 1);
        assert_eq!(cache.increment("counter").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn hash_field_roundtrip() {
        let cache = MemoryCache::new();
        cache.hset("correlation_id:abc", "start_time", "123").await.unwrap();
        assert_eq!(
            cache.hget("correlation_id:abc", "start_time").await.unwrap(),
            Some("123".to_string())
        );
        cache.hdel("correlation_id:abc", &["start_time"]).await.unwrap();
        assert_eq!(cache.hget("correlation_id:abc", "start_time").await.unwrap(), None);
    }
}
