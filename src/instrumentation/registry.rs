//! Instrumentation Hook Registry
//!
//! Process-wide, ordered list of profiling callbacks. Registering the first
//! callback activates subsystem timing; it stays installed after the last
//! one is removed, which is harmless because an empty registry turns off
//! per-request profiling in the middleware.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, warn};

use super::timing::Instrumentation;
use crate::tracking::{RequestEnv, RequestOutcome};

/// Callback invoked with every tracked request
pub type RequestHook = Arc<dyn Fn(&RequestEnv, &RequestOutcome) -> anyhow::Result<()> + Send + Sync>;

pub struct HookRegistry {
    hooks: RwLock<Vec<RequestHook>>,
    instrumentation: Arc<Instrumentation>,
}

impl HookRegistry {
    pub fn new(instrumentation: Arc<Instrumentation>) -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            instrumentation,
        }
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static Arc<HookRegistry> {
        static GLOBAL: OnceLock<Arc<HookRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(HookRegistry::new(Arc::new(Instrumentation::new()))))
    }

    pub fn instrumentation(&self) -> &Arc<Instrumentation> {
        &self.instrumentation
    }

    pub fn register(&self, hook: RequestHook) {
        let first = {
            let mut hooks = self.hooks.write();
            hooks.push(hook);
            hooks.len() == 1
        };
        if first {
            self.instrumentation.activate();
        }
    }

    /// Remove every registration of `hook`. Returns whether anything was removed.
    pub fn unregister(&self, hook: &RequestHook) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|registered| !Arc::ptr_eq(registered, hook));
        hooks.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Call every hook in registration order. A failing or panicking hook is
    /// logged and skipped. Returns the number of hooks that failed.
    pub fn notify_all(&self, env: &RequestEnv, outcome: &RequestOutcome) -> usize {
        // Snapshot so the lock is not held while callbacks run
        let hooks = self.hooks.read().clone();
        let mut failures = 0;

        for (index, hook) in hooks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| hook(env, outcome))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(hook = index, path = %env.path, "Request hook failed: {:#}", e);
                }
                Err(_) => {
                    failures += 1;
                    error!(hook = index, path = %env.path, "Request hook panicked");
                }
            }
        }

        failures
    }
}

/// Hook logging requests whose inner application time exceeds `threshold`
pub fn slow_request_hook(threshold: Duration) -> RequestHook {
    Arc::new(move |env: &RequestEnv, outcome: &RequestOutcome| -> anyhow::Result<()> {
        let Some(timing) = outcome.timing.as_ref() else {
            return Ok(());
        };
        if timing.total > threshold {
            warn!(
                request_id = %env.request_id,
                method = %env.method,
                path = %env.path,
                host = %env.tenant.host(),
                status = outcome.status,
                total_ms = timing.total.as_millis() as u64,
                sql_calls = timing.sql.calls,
                sql_ms = timing.sql.duration.as_millis() as u64,
                redis_calls = timing.redis.calls,
                redis_ms = timing.redis.duration.as_millis() as u64,
                "Slow request"
            );
        }
        Ok(())
    })
}
