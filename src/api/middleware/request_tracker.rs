//! Request Tracker Middleware
//!
//! Wraps the application:
//! 1. Rate limit check; a denied request gets a bare 429 and nothing else
//! 2. Inner application call, profiled when hooks are registered
//! 3. Best-effort classification and response annotation
//! 4. Counter increments and hook notifications handed to the dispatcher
//!
//! The response from step 2 is always what the client receives.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::admission::{Admission, ClientIdentity, RateLimiter};
use crate::instrumentation::HookRegistry;
use crate::metrics::{self, MetricsAggregator};
use crate::services::Dispatcher;
use crate::tracking::{RequestClassifier, RequestEnv, RequestOutcome, ResponseFacts};

pub const RATE_LIMITED_BODY: &str = "Slow down, too Many Requests from this IP Address";

/// Set when the request was counted as a page view
pub static TRACK_VIEW_MARKER: HeaderName = HeaderName::from_static("x-discourse-trackview");
/// Inner application time in seconds
pub static RUNTIME_HEADER: HeaderName = HeaderName::from_static("x-runtime");

pub struct RequestTracker {
    limiter: Arc<RateLimiter>,
    classifier: RequestClassifier,
    aggregator: Arc<MetricsAggregator>,
    hooks: Arc<HookRegistry>,
    dispatcher: Dispatcher,
    trust_forwarded_for: bool,
}

impl RequestTracker {
    pub fn new(
        limiter: Arc<RateLimiter>,
        classifier: RequestClassifier,
        aggregator: Arc<MetricsAggregator>,
        hooks: Arc<HookRegistry>,
        dispatcher: Dispatcher,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            limiter,
            classifier,
            aggregator,
            hooks,
            dispatcher,
            trust_forwarded_for,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn handle(&self, request: Request<Body>, next: Next) -> Response {
        let identity = ClientIdentity::from_request(&request, self.trust_forwarded_for);

        if let Admission::Deny { tier } = self.limiter.admit(&identity).await {
            metrics::record_rate_limit_rejection(&tier);
            return rate_limited_response();
        }

        let env = RequestEnv::capture(&request, &identity);

        let start = Instant::now();
        let (mut response, timing) = if self.hooks.is_empty() {
            (next.run(request).await, None)
        } else {
            let (response, timing) = self.hooks.instrumentation().profile(next.run(request)).await;
            (response, Some(timing))
        };
        let elapsed = start.elapsed();

        if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
            response.headers_mut().insert(RUNTIME_HEADER.clone(), value);
        }

        let facts = ResponseFacts::from_response(&response);
        let classified = catch_unwind(AssertUnwindSafe(|| {
            self.classifier.classify(&env, &facts, elapsed, timing)
        }));

        match classified {
            Ok(outcome) => {
                if outcome.track_view {
                    response
                        .headers_mut()
                        .insert(TRACK_VIEW_MARKER.clone(), HeaderValue::from_static("1"));
                }
                self.defer_bookkeeping(env, outcome);
            }
            Err(_) => {
                warn!(path = %env.path, "Request classification failed, skipping request metrics");
            }
        }

        response
    }

    fn defer_bookkeeping(&self, env: RequestEnv, outcome: RequestOutcome) {
        let aggregator = Arc::clone(&self.aggregator);
        let hooks = Arc::clone(&self.hooks);
        let tenant = env.tenant.clone();

        self.dispatcher.defer(tenant, "request_bookkeeping", async move {
            aggregator.record(&outcome).await;
            if !hooks.is_empty() {
                hooks.notify_all(&env, &outcome);
            }
            Ok(())
        });
    }
}

/// Fixed 429: no headers, plaintext body
pub fn rate_limited_response() -> Response {
    let mut response = Response::new(Body::from(RATE_LIMITED_BODY));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
}

pub async fn request_tracker_middleware(
    State(tracker): State<Arc<RequestTracker>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    tracker.handle(request, next).await
}
