//! Request Classifier
//!
//! Turns a finished request/response pair into a [`RequestOutcome`]. Pure:
//! nothing here touches shared state or mutates the response.
//!
//! Precedence:
//! 1. Background transport and beacon paths are flagged and never count as views
//! 2. Page-view eligibility: status 200, then the override header, then
//!    "plain GET navigation returning HTML"
//! 3. Crawler / mobile / signed-in facts come from the fingerprint oracle

use axum::http::{Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::env::{RequestEnv, ResponseFacts, TrackViewOverride};
use super::fingerprint::ClientFingerprint;
use crate::instrumentation::RequestTiming;

/// Long-poll / push transport
pub const BACKGROUND_PATH_PREFIX: &str = "/message-bus/";
/// Read-timing beacon endpoint
pub const TIMINGS_BEACON_PATH: &str = "/topics/timings";

/// Per-request facts consumed by the aggregator and by hooks
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub status: u16,
    pub is_crawler: bool,
    pub has_auth_cookie: bool,
    pub is_mobile: bool,
    pub is_background: bool,
    pub track_view: bool,
    /// Time spent in the inner application
    pub elapsed: Duration,
    /// Subsystem breakdown, present while profiling hooks are registered
    pub timing: Option<RequestTiming>,
}

pub fn is_background_path(path: &str) -> bool {
    path.starts_with(BACKGROUND_PATH_PREFIX) || path == TIMINGS_BEACON_PATH
}

#[derive(Clone)]
pub struct RequestClassifier {
    fingerprint: Arc<dyn ClientFingerprint>,
}

impl RequestClassifier {
    pub fn new(fingerprint: Arc<dyn ClientFingerprint>) -> Self {
        Self { fingerprint }
    }

    pub fn classify(
        &self,
        env: &RequestEnv,
        response: &ResponseFacts,
        elapsed: Duration,
        timing: Option<RequestTiming>,
    ) -> RequestOutcome {
        let is_background = is_background_path(&env.path);

        RequestOutcome {
            status: response.status.as_u16(),
            is_crawler: self.fingerprint.is_crawler(env),
            has_auth_cookie: self.fingerprint.has_auth_cookie(env),
            is_mobile: self.fingerprint.is_mobile(env),
            is_background,
            track_view: !is_background && track_view(env, response),
            elapsed,
            timing,
        }
    }
}

fn track_view(env: &RequestEnv, response: &ResponseFacts) -> bool {
    if response.status != StatusCode::OK {
        return false;
    }
    match env.track_view_override() {
        Some(TrackViewOverride::Suppress) => false,
        Some(TrackViewOverride::Force) => true,
        None => env.method == Method::GET && !env.is_xhr() && response.is_html(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::ClientIdentity;
    use crate::tracking::env::TRACK_VIEW_HEADER;
    use crate::tracking::UserAgentFingerprint;
    use axum::body::Body;
    use axum::http::Request;

    const FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

    fn classifier() -> RequestClassifier {
        RequestClassifier::new(Arc::new(UserAgentFingerprint::new("_t").unwrap()))
    }

    fn request(method: Method, path: &str, headers: &[(&str, &str)]) -> RequestEnv {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("user-agent", FIREFOX);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();
        RequestEnv::capture(&request, &ClientIdentity::new("203.0.113.5"))
    }

    fn response(status: u16, content_type: Option<&str>) -> ResponseFacts {
        ResponseFacts {
            status: StatusCode::from_u16(status).unwrap(),
            content_type: content_type.map(str::to_string),
        }
    }

    fn html_200() -> ResponseFacts {
        response(200, Some("text/html; charset=utf-8"))
    }

    #[test]
    fn test_navigational_html_get_is_a_view() {
        let outcome = classifier().classify(&request(Method::GET, "/latest", &[]), &html_200(), Duration::ZERO, None);
        assert!(outcome.track_view);
        assert!(!outcome.is_background);
        assert!(!outcome.is_crawler);
        assert_eq!(outcome.status, 200);
    }

    #[test]
    fn test_override_zero_suppresses_view() {
        for value in ["0", "false"] {
            let env = request(Method::GET, "/latest", &[(TRACK_VIEW_HEADER, value)]);
            assert!(!classifier().classify(&env, &html_200(), Duration::ZERO, None).track_view);
        }
    }

    #[test]
    fn test_override_truthy_forces_view() {
        let env = request(
            Method::POST,
            "/latest.json",
            &[(TRACK_VIEW_HEADER, "1"), ("x-requested-with", "XMLHttpRequest")],
        );
        let outcome = classifier().classify(&env, &response(200, Some("application/json")), Duration::ZERO, None);
        assert!(outcome.track_view);
    }

    #[test]
    fn test_override_cannot_force_non_200() {
        let env = request(Method::GET, "/latest", &[(TRACK_VIEW_HEADER, "1")]);
        assert!(!classifier().classify(&env, &response(404, Some("text/html")), Duration::ZERO, None).track_view);
        assert!(!classifier().classify(&env, &response(201, Some("text/html")), Duration::ZERO, None).track_view);
    }

    #[test]
    fn test_non_navigational_requests_are_not_views() {
        let xhr = request(Method::GET, "/latest", &[("x-requested-with", "XMLHttpRequest")]);
        assert!(!classifier().classify(&xhr, &html_200(), Duration::ZERO, None).track_view);

        let post = request(Method::POST, "/latest", &[]);
        assert!(!classifier().classify(&post, &html_200(), Duration::ZERO, None).track_view);

        let json = request(Method::GET, "/latest.json", &[]);
        assert!(!classifier().classify(&json, &response(200, Some("application/json")), Duration::ZERO, None).track_view);

        let untyped = request(Method::GET, "/latest", &[]);
        assert!(!classifier().classify(&untyped, &response(200, None), Duration::ZERO, None).track_view);
    }

    #[test]
    fn test_background_paths() {
        assert!(is_background_path("/message-bus/abc/poll"));
        assert!(is_background_path("/topics/timings"));
        assert!(!is_background_path("/topics/timings/extra"));
        assert!(!is_background_path("/message-bus"));
        assert!(!is_background_path("/t/topic/1"));
    }

    #[test]
    fn test_background_request_is_never_a_view() {
        let env = request(Method::GET, "/message-bus/abc/poll", &[(TRACK_VIEW_HEADER, "1")]);
        let outcome = classifier().classify(&env, &html_200(), Duration::ZERO, None);
        assert!(outcome.is_background);
        assert!(!outcome.track_view);
    }

    #[test]
    fn test_timings_beacon_is_background() {
        let env = request(Method::POST, "/topics/timings", &[]);
        let outcome = classifier().classify(&env, &response(200, None), Duration::ZERO, None);
        assert!(outcome.is_background);
        assert!(!outcome.track_view);
    }

    #[test]
    fn test_fingerprint_facts_and_timing_are_carried() {
        let env = request(
            Method::GET,
            "/latest",
            &[("cookie", "_t=token")],
        );
        let timing = RequestTiming::default();
        let outcome = classifier().classify(&env, &html_200(), Duration::from_millis(12), Some(timing.clone()));
        assert!(outcome.has_auth_cookie);
        assert!(!outcome.is_mobile);
        assert_eq!(outcome.elapsed, Duration::from_millis(12));
        assert_eq!(outcome.timing, Some(timing));
    }
}
