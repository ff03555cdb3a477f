//! Redis Cache Layer
//!
//! Connection management and key layout for the shared counter store.

pub mod keys;
pub mod redis_client;

pub use keys::{ttl, CacheKey};
pub use redis_client::{RedisClient, RedisConfig};
