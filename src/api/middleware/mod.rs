//! API Middleware
//!
//! Contains middleware for:
//! - Per-IP admission control
//! - Request classification and deferred request metrics
//! - Profiling hook dispatch

pub mod request_tracker;

pub use request_tracker::{request_tracker_middleware, RequestTracker};
