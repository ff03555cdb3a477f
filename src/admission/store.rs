//! Counter Store Adapters
//!
//! Shared counters with atomic increment-and-expire semantics. Redis is the
//! distributed backend; the in-memory store covers single-instance
//! deployments, Redis outages at startup, and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::RedisClient;
use crate::instrumentation::{Instrumentation, Subsystem};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, starting a `window_secs` expiry when the key is new.
    /// Returns the count within the current window.
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> Result<u64, StoreError>;
}

/// Window entry for a single key
#[derive(Clone)]
struct WindowEntry {
    count: u64,
    expires_at: Instant,
}

/// In-memory store using DashMap
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, WindowEntry>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop windows that have expired
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start cleanup task to remove expired entries
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match store.upgrade() {
                    Some(store) => store.purge_expired(),
                    None => break,
                }
            }
        });
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> Result<u64, StoreError> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        // The entry guard holds the shard lock, so check-reset-increment is atomic per key
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            expires_at: now + window,
        });

        // Reset window if expired
        if now >= entry.expires_at {
            entry.count = 0;
            entry.expires_at = now + window;
        }

        entry.count += 1;
        Ok(entry.count)
    }
}

/// Redis-backed store; safe across processes and machines
pub struct RedisCounterStore {
    redis: Arc<RedisClient>,
    instrumentation: Arc<Instrumentation>,
}

impl RedisCounterStore {
    pub fn new(redis: Arc<RedisClient>, instrumentation: Arc<Instrumentation>) -> Self {
        Self { redis, instrumentation }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> Result<u64, StoreError> {
        let count = self
            .instrumentation
            .time(Subsystem::Redis, self.redis.incr_with_expiry(key, window_secs))
            .await?;
        Ok(count.max(0) as u64)
    }
}
