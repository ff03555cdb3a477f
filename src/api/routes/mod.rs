use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::api::middleware::request_tracker_middleware;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Site
        .route("/", get(handlers::site::home))
        .route("/message-bus/poll", get(handlers::site::message_bus_poll))
        .route("/topics/timings", post(handlers::site::timings_beacon))
        // Operations
        .route("/api/status", get(handlers::status::get_status))
        .route("/health", get(handlers::status::health_check))
        .route("/metrics", get(handlers::status::get_metrics))
        .route("/srv/counters", get(handlers::status::get_counters))
        .layer(axum_middleware::from_fn_with_state(
            state.tracker.clone(),
            request_tracker_middleware,
        ))
        .with_state(state)
}
