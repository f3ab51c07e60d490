//! Cache abstraction. Every key layout in §6 (rate limiter, correlation
//! hashes, content-id cache, interest lock, access grant, cleanup counter)
//! is expressed against this one trait so the rest of the crate never talks
//! to Redis or an in-memory map directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),
    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Ephemeral key-value store. Every method takes `&self` — implementations
/// own their own interior mutability / connection pooling.
pub trait Cache: Send + Sync {
    /// Read a string value, or `None` if absent or expired.
    fn get(&self, key: &str) -> BoxFuture<'_, CacheResult<Option<String>>>;

    /// Write a string value with an optional TTL.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BoxFuture<'_, CacheResult<()>>;

    /// Remove a key. A missing key is not an error.
    fn delete(&self, key: &str) -> BoxFuture<'_, CacheResult<()>>;

    /// Whether a (non-expired) key is present.
    fn exists(&self, key: &str) -> BoxFuture<'_, CacheResult<bool>>;

    /// Atomically set `key` to `value` with `ttl` only if it does not
    /// already exist. Returns `true` iff this call performed the write —
    /// the primitive behind the interest-accumulator lock.
    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> BoxFuture<'_, CacheResult<bool>>;

    /// Atomically increment the integer stored at `key` (treating a missing
    /// key as 0) and return the new value. The rate limiter and the
    /// cleanup-event counter are both built on this.
    fn increment(&self, key: &str) -> BoxFuture<'_, CacheResult<i64>>;

    /// Attach (or replace) a TTL on an existing key.
    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'_, CacheResult<()>>;

    /// Set one field of a hash.
    fn hset(&self, key: &str, field: &str, value: &str) -> BoxFuture<'_, CacheResult<()>>;

    /// Read one field of a hash.
    fn hget(&self, key: &str, field: &str) -> BoxFuture<'_, CacheResult<Option<String>>>;

    /// Delete one or more fields of a hash. Missing fields are not an error.
    fn hdel(&self, key: &str, fields: &[&str]) -> BoxFuture<'_, CacheResult<()>>;
}
