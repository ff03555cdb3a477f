//! Counter sinks
//!
//! Where aggregated request counters end up: Prometheus for live
//! monitoring, per-day Redis counters for later persistence, or memory.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{labels, names, CounterKey};
use crate::cache::{ttl, CacheKey, RedisClient};
use crate::instrumentation::{Instrumentation, Subsystem};
use crate::services::TenantContext;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Counter sink failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait CounterSink: Send + Sync {
    async fn increment(&self, tenant: &TenantContext, key: CounterKey) -> Result<(), SinkError>;
}

/// Prometheus counter `app_requests_total{host, kind}`
#[derive(Debug, Default)]
pub struct PrometheusCounterSink;

#[async_trait]
impl CounterSink for PrometheusCounterSink {
    async fn increment(&self, tenant: &TenantContext, key: CounterKey) -> Result<(), SinkError> {
        counter!(
            names::APP_REQUESTS_TOTAL,
            labels::HOST => tenant.host().to_string(),
            labels::KIND => key.as_str()
        )
        .increment(1);
        Ok(())
    }
}

/// In-process counters per (host, key)
#[derive(Debug, Default)]
pub struct MemoryCounterSink {
    counts: DashMap<(String, CounterKey), u64>,
}

impl MemoryCounterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str, key: CounterKey) -> u64 {
        self.counts
            .get(&(host.to_string(), key))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Non-zero counters for one host
    pub fn snapshot(&self, host: &str) -> BTreeMap<CounterKey, u64> {
        self.counts
            .iter()
            .filter(|entry| entry.key().0 == host)
            .map(|entry| (entry.key().1, *entry.value()))
            .collect()
    }
}

#[async_trait]
impl CounterSink for MemoryCounterSink {
    async fn increment(&self, tenant: &TenantContext, key: CounterKey) -> Result<(), SinkError> {
        *self
            .counts
            .entry((tenant.host().to_string(), key))
            .or_insert(0) += 1;
        Ok(())
    }
}

/// Daily Redis counters `app_req:{host}:{kind}:{YYYYMMDD}`, picked up by a
/// periodic flush into long-term storage
pub struct RedisCounterSink {
    redis: Arc<RedisClient>,
    instrumentation: Arc<Instrumentation>,
}

impl RedisCounterSink {
    pub fn new(redis: Arc<RedisClient>, instrumentation: Arc<Instrumentation>) -> Self {
        Self { redis, instrumentation }
    }
}

#[async_trait]
impl CounterSink for RedisCounterSink {
    async fn increment(&self, tenant: &TenantContext, key: CounterKey) -> Result<(), SinkError> {
        let redis_key = CacheKey::app_request(tenant.host(), key.as_str(), Utc::now().date_naive());
        self.instrumentation
            .time(
                Subsystem::Redis,
                self.redis.incr_with_expiry(&redis_key, ttl::APP_REQUEST_COUNTER),
            )
            .await?;
        Ok(())
    }
}

/// Increments every inner sink; reports the first failure after trying all
#[derive(Default)]
pub struct FanoutCounterSink {
    sinks: Vec<Arc<dyn CounterSink>>,
}

impl FanoutCounterSink {
    pub fn new(sinks: Vec<Arc<dyn CounterSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn CounterSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl CounterSink for FanoutCounterSink {
    async fn increment(&self, tenant: &TenantContext, key: CounterKey) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.increment(tenant, key).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
