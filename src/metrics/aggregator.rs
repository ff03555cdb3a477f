//! Metrics Aggregator
//!
//! Maps a classified request to the counters it increments:
//! - `http_total`, always
//! - one status bucket: 5xx, else background, else 4xx / 3xx / 2xx
//! - for page views, one of crawler / signed in / anonymous, plus the
//!   mobile split for humans
//!
//! Increments go to the tenant installed for the running task.

use std::sync::Arc;
use tracing::warn;

use super::sink::CounterSink;
use super::CounterKey;
use crate::services::TenantContext;
use crate::tracking::RequestOutcome;

pub struct MetricsAggregator {
    sink: Arc<dyn CounterSink>,
}

impl MetricsAggregator {
    pub fn new(sink: Arc<dyn CounterSink>) -> Self {
        Self { sink }
    }

    /// Increment every counter for `outcome`. Sink failures are logged and dropped.
    pub async fn record(&self, outcome: &RequestOutcome) {
        let tenant = TenantContext::current();

        for key in counters_for(outcome) {
            if let Err(e) = self.sink.increment(&tenant, key).await {
                warn!(
                    host = %tenant.host(),
                    counter = %key,
                    "Failed to increment request counter: {}",
                    e
                );
            }
        }

        super::record_request_duration(tenant.host(), outcome.elapsed.as_secs_f64());
    }
}

/// Counters a request contributes to
pub fn counters_for(outcome: &RequestOutcome) -> Vec<CounterKey> {
    let mut keys = vec![CounterKey::HttpTotal];

    if let Some(bucket) = status_bucket(outcome) {
        keys.push(bucket);
    }

    if outcome.track_view {
        if outcome.is_crawler {
            keys.push(CounterKey::PageViewCrawler);
        } else if outcome.has_auth_cookie {
            keys.push(CounterKey::PageViewLoggedIn);
            if outcome.is_mobile {
                keys.push(CounterKey::PageViewLoggedInMobile);
            }
        } else {
            keys.push(CounterKey::PageViewAnon);
            if outcome.is_mobile {
                keys.push(CounterKey::PageViewAnonMobile);
            }
        }
    }

    keys
}

fn status_bucket(outcome: &RequestOutcome) -> Option<CounterKey> {
    match outcome.status {
        500..=599 => Some(CounterKey::Http5xx),
        _ if outcome.is_background => Some(CounterKey::HttpBackground),
        400..=499 => Some(CounterKey::Http4xx),
        300..=399 => Some(CounterKey::Http3xx),
        200..=299 => Some(CounterKey::Http2xx),
        _ => None,
    }
}
