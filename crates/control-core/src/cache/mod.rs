mod memory;
#[cfg(feature = "cache-redis")]
mod redis;
mod traits;

pub use memory::MemoryCache;
#[cfg(feature = "cache-redis")]
pub use redis::RedisCache;
pub use traits::{Cache, CacheError, CacheResult};
