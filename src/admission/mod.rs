//! Request admission: per-IP rate limiting in front of the application

pub mod identity;
pub mod rate_limit;
pub mod store;

pub use identity::{is_private_address, ClientIdentity};
pub use rate_limit::{Admission, RateLimitCheck, RateLimitPolicy, RateLimitTier, RateLimiter};
pub use store::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreError};
