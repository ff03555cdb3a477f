//! Request Metrics
//!
//! Provides the coarse per-host request counters and the Prometheus
//! exporter:
//! - Status-class counters (2xx..5xx, background)
//! - Page-view counters (crawler, signed in, anonymous, mobile splits)
//! - Inner application duration histogram
//! - Rate limiter warnings and rejections

pub mod aggregator;
pub mod sink;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::fmt;

pub use aggregator::MetricsAggregator;
pub use sink::{
    CounterSink, FanoutCounterSink, MemoryCounterSink, PrometheusCounterSink, RedisCounterSink,
    SinkError,
};

/// Metric names as constants for consistency
pub mod names {
    pub const APP_REQUESTS_TOTAL: &str = "app_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const RATE_LIMIT_WARNINGS_TOTAL: &str = "rate_limit_warnings_total";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";
}

/// Label keys
pub mod labels {
    pub const HOST: &str = "host";
    pub const KIND: &str = "kind";
    pub const TIER: &str = "tier";
}

/// Request counter names, one per aggregated outcome class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "&'static str")]
pub enum CounterKey {
    HttpTotal,
    Http2xx,
    Http3xx,
    Http4xx,
    Http5xx,
    HttpBackground,
    PageViewCrawler,
    PageViewLoggedIn,
    PageViewLoggedInMobile,
    PageViewAnon,
    PageViewAnonMobile,
}

impl CounterKey {
    pub const ALL: [CounterKey; 11] = [
        Self::HttpTotal,
        Self::Http2xx,
        Self::Http3xx,
        Self::Http4xx,
        Self::Http5xx,
        Self::HttpBackground,
        Self::PageViewCrawler,
        Self::PageViewLoggedIn,
        Self::PageViewLoggedInMobile,
        Self::PageViewAnon,
        Self::PageViewAnonMobile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpTotal => "http_total",
            Self::Http2xx => "http_2xx",
            Self::Http3xx => "http_3xx",
            Self::Http4xx => "http_4xx",
            Self::Http5xx => "http_5xx",
            Self::HttpBackground => "http_background",
            Self::PageViewCrawler => "page_view_crawler",
            Self::PageViewLoggedIn => "page_view_logged_in",
            Self::PageViewLoggedInMobile => "page_view_logged_in_mobile",
            Self::PageViewAnon => "page_view_anon",
            Self::PageViewAnonMobile => "page_view_anon_mobile",
        }
    }
}

impl From<CounterKey> for &'static str {
    fn from(key: CounterKey) -> Self {
        key.as_str()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialize Prometheus metrics exporter
///
/// Returns a handle that can be used to render metrics
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        // Inner application duration buckets (in seconds)
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()
}

/// Record inner application duration for a host
pub fn record_request_duration(host: &str, duration_secs: f64) {
    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::HOST => host.to_string()
    )
    .record(duration_secs);
}

/// Record a request rejected by the rate limiter
pub fn record_rate_limit_rejection(tier: &str) {
    counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        labels::TIER => tier.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_names() {
        assert_eq!(CounterKey::HttpTotal.as_str(), "http_total");
        assert_eq!(CounterKey::Http5xx.to_string(), "http_5xx");
        assert_eq!(CounterKey::PageViewAnonMobile.as_str(), "page_view_anon_mobile");
        assert_eq!(
            serde_json::to_string(&CounterKey::PageViewLoggedIn).unwrap(),
            "\"page_view_logged_in\""
        );
    }

    #[test]
    fn test_counter_names_are_unique() {
        let mut names: Vec<&str> = CounterKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CounterKey::ALL.len());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request_duration("default", 0.01);
        record_rate_limit_rejection("ip_10_secs_limit");
    }
}
