pub mod admission;
pub mod api;
pub mod cache;
pub mod config;
pub mod instrumentation;
pub mod metrics;
pub mod services;
pub mod tracking;

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::admission::{CounterStore, RateLimiter};
use crate::api::middleware::RequestTracker;
use crate::config::AppConfig;
use crate::instrumentation::HookRegistry;
use crate::metrics::{
    CounterSink, FanoutCounterSink, MemoryCounterSink, MetricsAggregator, PrometheusCounterSink,
};
use crate::services::Dispatcher;
use crate::tracking::{RequestClassifier, UserAgentFingerprint};

pub struct AppState {
    pub config: AppConfig,
    pub tracker: Arc<RequestTracker>,
    /// Always-on in-process counters, served at `/srv/counters`
    pub counters: Arc<MemoryCounterSink>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the tracker from configuration. Must run inside a Tokio runtime;
    /// the dispatcher's workers are spawned here. Fails only if the
    /// user agent patterns do not compile.
    pub fn build(
        config: AppConfig,
        store: Arc<dyn CounterStore>,
        extra_sinks: Vec<Arc<dyn CounterSink>>,
        hooks: Arc<HookRegistry>,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<Self, regex::Error> {
        let counters = Arc::new(MemoryCounterSink::new());

        let mut fanout = FanoutCounterSink::new(vec![counters.clone() as Arc<dyn CounterSink>]);
        if prometheus.is_some() {
            fanout.push(Arc::new(PrometheusCounterSink));
        }
        for sink in extra_sinks {
            fanout.push(sink);
        }

        let limiter = Arc::new(RateLimiter::new(store, config.rate_limit.policy()));
        let fingerprint = Arc::new(UserAgentFingerprint::new(config.auth_cookie_name.clone())?);

        let tracker = Arc::new(RequestTracker::new(
            limiter,
            RequestClassifier::new(fingerprint),
            Arc::new(MetricsAggregator::new(Arc::new(fanout))),
            hooks,
            Dispatcher::start(&config.dispatcher),
            config.rate_limit.trust_forwarded_for,
        ));

        Ok(Self {
            config,
            tracker,
            counters,
            prometheus,
        })
    }
}
