pub mod coalesce;
pub mod rate_limit;

pub use coalesce::{coalesce_backoff, InterestLock};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitConfig};
