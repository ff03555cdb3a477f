//! Cache key layout
//!
//! All keys written by this crate go through here so the layout stays
//! consistent between the limiter, the counter sinks and tooling that
//! reads them back.

use chrono::NaiveDate;

/// Key TTLs in seconds
pub mod ttl {
    /// Daily request counters are kept long enough for a flusher to pick them up
    pub const APP_REQUEST_COUNTER: u64 = 3 * 24 * 60 * 60;
}

pub struct CacheKey;

impl CacheKey {
    /// Rate limit counter for one tier and identity, e.g. `rl:ip:ip_10_secs_limit:203.0.113.5`
    pub fn rate_limit(scope: &str, tier: &str, identity: &str) -> String {
        format!("rl:{scope}:{tier}:{identity}")
    }

    /// Daily application request counter, e.g. `app_req:forum.example.com:http_2xx:20261017`
    pub fn app_request(host: &str, kind: &str, date: NaiveDate) -> String {
        format!("app_req:{host}:{kind}:{}", date.format("%Y%m%d"))
    }
}
