use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::metrics::CounterKey;
use crate::services::TenantContext;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub environment: String,
    pub rate_limit_enabled: bool,
    pub rate_limit_mode: String,
    pub hooks: usize,
    pub pending_tasks: usize,
}

#[derive(Debug, Serialize)]
pub struct CountersResponse {
    pub host: String,
    pub counters: BTreeMap<CounterKey, u64>,
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let policy = state.tracker.limiter().policy();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        rate_limit_enabled: policy.enabled,
        rate_limit_mode: policy.mode.to_string(),
        hooks: state.tracker.hooks().len(),
        pending_tasks: state.tracker.dispatcher().pending(),
    })
}

/// Prometheus text exposition
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics exporter not installed").into_response(),
    }
}

/// In-process counters for the requesting host
pub async fn get_counters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<CountersResponse> {
    let tenant = TenantContext::from_headers(&headers);

    Json(CountersResponse {
        counters: state.counters.snapshot(tenant.host()),
        host: tenant.host().to_string(),
    })
}
