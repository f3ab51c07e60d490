//! Redis-backed `Cache` implementation.
//!
//! Connection handling follows the teacher's `resilience::rate_limit_redis`
//! pattern: a `redis::aio::ConnectionManager` cloned per call (it is
//! internally `Arc`-backed and reconnects transparently), plumbed through
//! the crate's `Cache` trait rather than exposed directly.

use std::pin::Pin;
use std::time::Duration;

use redis::AsyncCommands;

use super::traits::{Cache, CacheError, CacheResult};

pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(RedisCache { conn })
    }

    pub fn from_connection(conn: redis::aio::ConnectionManager) -> Self {
        RedisCache { conn }
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<Option<String>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.get(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
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
            let mut conn = self.conn.clone();
            match ttl {
                Some(d) => conn
                    .set_ex::<_, _, ()>(&key, &value, d.as_secs().max(1))
                    .await
                    .map_err(|e| CacheError::Backend(e.to_string())),
                None => conn
                    .set::<_, _, ()>(&key, &value)
                    .await
                    .map_err(|e| CacheError::Backend(e.to_string())),
            }
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }

    fn exists(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.exists(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Pin<Box<dyn std::future::Future<Output = CacheResult<bool>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let acquired: bool = redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<_, Option<String>>(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?
                .is_some();
            Ok(acquired)
        })
    }

    fn increment(&self, key: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<i64>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.incr(&key, 1)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.expire::<_, ()>(&key, ttl.as_secs().max(1) as i64)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        let field = field.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.hset::<_, _, _, ()>(&key, &field, &value)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }

    fn hget(&self, key: &str, field: &str) -> Pin<Box<dyn std::future::Future<Output = CacheResult<Option<String>>> + Send + '_>> {
        let key = key.to_string();
        let field = field.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.hget(&key, &field)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }

    fn hdel(&self, key: &str, fields: &[&str]) -> Pin<Box<dyn std::future::Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        let fields: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.hdel::<_, _, ()>(&key, fields)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        })
    }
}

// Integration tests against a live Redis are intentionally omitted here, in
// keeping with the teacher's `#[ignore = "requires Redis"]` convention for
// this exact kind of backend — see `resilience::rate_limit` for coverage
// against `MemoryCache`, which exercises the same `Cache` trait surface.
