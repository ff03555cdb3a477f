//! Tenant (host) context
//!
//! Which site a unit of work belongs to. Captured from the request when it
//! arrives and carried into deferred work, where it is installed as a
//! task-local so counter sinks attribute increments to the right host even
//! though the work runs later on another worker.

use axum::http::{header, HeaderMap};
use std::future::Future;

pub const DEFAULT_HOST: &str = "default";

tokio::task_local! {
    static CURRENT_TENANT: TenantContext;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    host: String,
}

impl TenantContext {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// The host from the `Host` header, port stripped and lowercased
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(strip_port)
            .filter(|h| !h.is_empty())
            .map(|h| Self::new(h.to_ascii_lowercase()))
            .unwrap_or_default()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The tenant installed for the running task, or the default site
    pub fn current() -> Self {
        CURRENT_TENANT
            .try_with(|tenant| tenant.clone())
            .unwrap_or_default()
    }

    /// Run `fut` with this tenant as the current one
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_TENANT.scope(self, fut).await
    }
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        // [::1]:8080
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
