//! Per-IP Rate Limiting
//!
//! Every tier is an independent fixed window in the shared counter store,
//! keyed by tier and identity. A request increments every tier's counter;
//! the first tier over its limit (fast window first) is the one reported.
//! Store failures fail open.

use metrics::counter;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use super::identity::ClientIdentity;
use super::store::CounterStore;
use crate::cache::CacheKey;
use crate::config::RateLimitMode;
use crate::metrics::names;

/// One (limit, window) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitTier {
    pub name: String,
    pub max_count: u64,
    pub window_secs: u64,
    /// Key prefix separating this family of counters from others
    pub scope: String,
}

impl RateLimitTier {
    pub fn per_ip(name: &str, max_count: u64, window_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            max_count,
            window_secs,
            scope: "ip".to_string(),
        }
    }

    fn key(&self, identity: &ClientIdentity) -> String {
        CacheKey::rate_limit(&self.scope, &self.name, identity.as_str())
    }
}

/// Limiter settings; replaced as a whole on configuration reload
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub mode: RateLimitMode,
    pub exempt_private: bool,
    /// Evaluated in order
    pub tiers: Vec<RateLimitTier>,
}

impl RateLimitPolicy {
    fn is_active(&self) -> bool {
        self.enabled && self.mode != RateLimitMode::Off && !self.tiers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny { tier: String },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Result of one limiter check, including tiers that tripped without blocking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCheck {
    pub admission: Admission,
    /// First tier over its limit, if any
    pub tripped: Option<String>,
}

impl RateLimitCheck {
    fn allow() -> Self {
        Self {
            admission: Admission::Allow,
            tripped: None,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policy: RwLock<Arc<RateLimitPolicy>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            policy: RwLock::new(Arc::new(policy)),
        }
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<RateLimitPolicy> {
        Arc::clone(&self.policy.read())
    }

    /// Swap in a new policy; requests already past the snapshot keep the old one
    pub fn reload(&self, policy: RateLimitPolicy) {
        tracing::info!(
            mode = %policy.mode,
            enabled = policy.enabled,
            tiers = policy.tiers.len(),
            "Rate limit policy reloaded"
        );
        *self.policy.write() = Arc::new(policy);
    }

    pub async fn admit(&self, identity: &ClientIdentity) -> Admission {
        self.check(identity).await.admission
    }

    pub async fn check(&self, identity: &ClientIdentity) -> RateLimitCheck {
        let policy = self.policy();
        if !policy.is_active() {
            return RateLimitCheck::allow();
        }
        // Trusted infrastructure never consumes quota
        if policy.exempt_private && identity.is_private() {
            return RateLimitCheck::allow();
        }

        let mut tripped: Option<(&RateLimitTier, u64)> = None;
        for tier in &policy.tiers {
            let count = match self
                .store
                .incr_with_expiry(&tier.key(identity), tier.window_secs)
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    warn!(
                        tier = %tier.name,
                        ip = %identity.as_str(),
                        "Rate limit counter unavailable, allowing request: {}",
                        e
                    );
                    continue;
                }
            };

            if count > tier.max_count && tripped.is_none() {
                tripped = Some((tier, count));
            }
        }

        let Some((tier, count)) = tripped else {
            return RateLimitCheck::allow();
        };

        if policy.mode.warns() {
            warn!(
                tier = %tier.name,
                ip = %identity.as_str(),
                count,
                limit = tier.max_count,
                window_secs = tier.window_secs,
                "Global IP rate limit exceeded for {}: {} ({} requests in {}s, limit {})",
                identity.as_str(),
                tier.name,
                count,
                tier.window_secs,
                tier.max_count
            );
            counter!(names::RATE_LIMIT_WARNINGS_TOTAL, "tier" => tier.name.clone()).increment(1);
        } else {
            debug!(tier = %tier.name, "Rate limit tier tripped");
        }

        let admission = if policy.mode.blocks() {
            Admission::Deny {
                tier: tier.name.clone(),
            }
        } else {
            Admission::Allow
        };

        RateLimitCheck {
            admission,
            tripped: Some(tier.name.clone()),
        }
    }
}
