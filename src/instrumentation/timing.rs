//! Subsystem timers around database and cache driver calls
//!
//! Call sites wrap driver work in [`Instrumentation::time`] (or an explicit
//! [`Instrumentation::start`] / [`SubsystemTimer::stop`] pair). Until timing
//! are activated the wrappers cost one atomic load. Once active, elapsed time
//! is added to the profile of the enclosing request, if there is one.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

tokio::task_local! {
    static ACTIVE_PROFILE: Arc<Mutex<RequestTiming>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Sql,
    Redis,
}

/// Calls and time spent in one subsystem during a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SubsystemTiming {
    pub calls: u32,
    pub duration: Duration,
}

/// Profile of one inner application call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestTiming {
    pub total: Duration,
    pub sql: SubsystemTiming,
    pub redis: SubsystemTiming,
}

impl RequestTiming {
    fn add(&mut self, subsystem: Subsystem, elapsed: Duration) {
        let entry = match subsystem {
            Subsystem::Sql => &mut self.sql,
            Subsystem::Redis => &mut self.redis,
        };
        entry.calls += 1;
        entry.duration += elapsed;
    }
}

/// Running timer; record it with [`SubsystemTimer::stop`]
#[must_use]
pub struct SubsystemTimer {
    subsystem: Subsystem,
    start: Option<Instant>,
}

impl SubsystemTimer {
    /// Stop the timer and add the elapsed time to the current request profile
    pub fn stop(self) -> Option<Duration> {
        let elapsed = self.start?.elapsed();
        let _ = ACTIVE_PROFILE.try_with(|profile| profile.lock().add(self.subsystem, elapsed));
        Some(elapsed)
    }
}

#[derive(Debug, Default)]
pub struct Instrumentation {
    installed: AtomicBool,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install timing. Returns true only for the call that installed them.
    pub fn activate(&self) -> bool {
        let installed = self
            .installed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if installed {
            tracing::info!("SQL and Redis timing installed");
        }
        installed
    }

    pub fn is_active(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn start(&self, subsystem: Subsystem) -> SubsystemTimer {
        SubsystemTimer {
            subsystem,
            start: self.is_active().then(Instant::now),
        }
    }

    /// Time a driver call
    pub async fn time<F: Future>(&self, subsystem: Subsystem, fut: F) -> F::Output {
        let timer = self.start(subsystem);
        let output = fut.await;
        let _ = timer.stop();
        output
    }

    /// Run `fut` as a profiled request; driver timers stopped while it runs are collected
    pub async fn profile<F: Future>(&self, fut: F) -> (F::Output, RequestTiming) {
        let profile = Arc::new(Mutex::new(RequestTiming::default()));
        let start = Instant::now();
        let output = ACTIVE_PROFILE.scope(Arc::clone(&profile), fut).await;

        let mut timing = profile.lock().clone();
        timing.total = start.elapsed();
        (output, timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_is_idempotent() {
        let instrumentation = Instrumentation::new();
        assert!(!instrumentation.is_active());
        assert!(instrumentation.activate());
        assert!(!instrumentation.activate());
        assert!(instrumentation.is_active());
    }

    #[tokio::test]
    async fn test_inactive_timing_records_nothing() {
        let instrumentation = Instrumentation::new();
        let (value, timing) = instrumentation
            .profile(async { instrumentation.time(Subsystem::Sql, async { 7 }).await })
            .await;

        assert_eq!(value, 7);
        assert_eq!(timing.sql.calls, 0);
    }

    #[tokio::test]
    async fn test_profile_collects_subsystem_timings() {
        let instrumentation = Instrumentation::new();
        instrumentation.activate();

        let (_, timing) = instrumentation
            .profile(async {
                instrumentation.time(Subsystem::Sql, async {}).await;
                instrumentation.time(Subsystem::Sql, async {}).await;
                let timer = instrumentation.start(Subsystem::Redis);
                tokio::time::sleep(Duration::from_millis(5)).await;
                assert!(timer.stop().is_some());
            })
            .await;

        assert_eq!(timing.sql.calls, 2);
        assert_eq!(timing.redis.calls, 1);
        assert!(timing.redis.duration >= Duration::from_millis(5));
        assert!(timing.total >= timing.redis.duration);
    }

    #[tokio::test]
    async fn test_timer_outside_profile_is_harmless() {
        let instrumentation = Instrumentation::new();
        instrumentation.activate();
        let timer = instrumentation.start(Subsystem::Redis);
        assert!(timer.stop().is_some());
    }
}
