//! Request and response snapshots
//!
//! The inner application consumes the request, so the facts needed after it
//! responds are captured up front. The same snapshot is handed to profiling
//! hooks.

use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode};
use uuid::Uuid;

use crate::admission::ClientIdentity;
use crate::services::TenantContext;

/// Explicit page-view override header
pub const TRACK_VIEW_HEADER: &str = "discourse-track-view";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackViewOverride {
    /// `0` or `false`
    Suppress,
    /// Any other non-empty value
    Force,
}

#[derive(Debug, Clone)]
pub struct RequestEnv {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub tenant: TenantContext,
    pub client_ip: String,
    pub headers: HeaderMap,
}

impl RequestEnv {
    pub fn capture<B>(request: &Request<B>, identity: &ClientIdentity) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            tenant: TenantContext::from_headers(request.headers()),
            client_ip: identity.as_str().to_string(),
            headers: request.headers().clone(),
        }
    }

    /// Header value as text; unreadable values count as absent
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT)
    }

    /// XHR-style asynchronous fetch rather than a navigation
    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with")
            .map(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
            .unwrap_or(false)
    }

    pub fn track_view_override(&self) -> Option<TrackViewOverride> {
        let value = self.header(TRACK_VIEW_HEADER)?.trim();
        if value.is_empty() {
            return None;
        }
        if value == "0" || value.eq_ignore_ascii_case("false") {
            Some(TrackViewOverride::Suppress)
        } else {
            Some(TrackViewOverride::Force)
        }
    }
}

/// What the classifier needs from the response
#[derive(Debug, Clone)]
pub struct ResponseFacts {
    pub status: StatusCode,
    pub content_type: Option<String>,
}

impl ResponseFacts {
    pub fn from_response<B>(response: &Response<B>) -> Self {
        Self {
            status: response.status(),
            content_type: response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn env_with(name: &'static str, value: &'static str) -> RequestEnv {
        let request = Request::builder()
            .uri("/t/some-topic/12?page=2")
            .header(name, value)
            .body(Body::empty())
            .unwrap();
        RequestEnv::capture(&request, &ClientIdentity::new("203.0.113.5"))
    }

    #[test]
    fn test_capture() {
        let env = env_with("host", "forum.example.com");
        assert_eq!(env.method, Method::GET);
        assert_eq!(env.path, "/t/some-topic/12");
        assert_eq!(env.tenant.host(), "forum.example.com");
        assert_eq!(env.client_ip, "203.0.113.5");
    }

    #[test]
    fn test_track_view_override_values() {
        assert_eq!(
            env_with(TRACK_VIEW_HEADER, "0").track_view_override(),
            Some(TrackViewOverride::Suppress)
        );
        assert_eq!(
            env_with(TRACK_VIEW_HEADER, "FALSE").track_view_override(),
            Some(TrackViewOverride::Suppress)
        );
        assert_eq!(
            env_with(TRACK_VIEW_HEADER, "1").track_view_override(),
            Some(TrackViewOverride::Force)
        );
        assert_eq!(env_with(TRACK_VIEW_HEADER, "").track_view_override(), None);
        assert_eq!(env_with("x-other", "1").track_view_override(), None);
    }

    #[test]
    fn test_unreadable_header_counts_as_absent() {
        let mut env = env_with("x-other", "1");
        env.headers.insert(
            TRACK_VIEW_HEADER,
            HeaderValue::from_bytes(b"\xff\xfe").unwrap(),
        );
        assert_eq!(env.track_view_override(), None);
    }

    #[test]
    fn test_xhr_detection() {
        assert!(env_with("x-requested-with", "XMLHttpRequest").is_xhr());
        assert!(!env_with("x-other", "1").is_xhr());
    }

    #[test]
    fn test_response_is_html() {
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(())
            .unwrap();
        assert!(ResponseFacts::from_response(&response).is_html());

        let response = Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(())
            .unwrap();
        assert!(!ResponseFacts::from_response(&response).is_html());
        assert!(!ResponseFacts::from_response(&Response::new(())).is_html());
    }
}
