//! Deferred Task Dispatcher
//!
//! Runs request bookkeeping off the response path:
//! 1. The middleware hands over a future plus the tenant it belongs to
//! 2. A bounded queue feeds a fixed pool of worker tasks
//! 3. Each job runs inside its tenant scope, in its own task so a panic
//!    is contained and logged
//!
//! Failures never reach the request that queued the work. Queued work is
//! not drained on process shutdown.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, warn};

use super::tenant::TenantContext;
use crate::config::DispatcherConfig;

struct DeferredJob {
    label: &'static str,
    tenant: TenantContext,
    task: BoxFuture<'static, anyhow::Result<()>>,
}

/// Tracks queued and running jobs so callers can wait for quiescence
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<DeferredJob>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    /// Spawn the worker pool on the current runtime
    pub fn start(config: &DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = Arc::new(InFlight::default());

        for worker in 0..config.workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move {
                debug!(worker, "Deferred task worker started");
                loop {
                    let job = { receiver.lock().await.recv().await };
                    match job {
                        Some(job) => run_job(job, &in_flight).await,
                        None => break,
                    }
                }
                debug!(worker, "Deferred task worker stopped");
            });
        }

        Self { sender, in_flight }
    }

    /// Queue `task` to run later under `tenant`. Never blocks: when the
    /// queue is full the job gets its own task instead of being dropped.
    pub fn defer<F>(&self, tenant: TenantContext, label: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.in_flight.enter();
        let job = DeferredJob {
            label,
            tenant,
            task: Box::pin(task),
        };

        if let Err(e) = self.sender.try_send(job) {
            let job = match e {
                mpsc::error::TrySendError::Full(job) => {
                    warn!(label, "Deferred task queue full, running job on a dedicated task");
                    job
                }
                mpsc::error::TrySendError::Closed(job) => job,
            };
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(async move { run_job(job, &in_flight).await });
        }
    }

    /// Number of jobs queued or running
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolve once every job deferred so far has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_job(job: DeferredJob, in_flight: &InFlight) {
    let DeferredJob {
        label,
        tenant,
        task,
    } = job;
    let host = tenant.host().to_string();

    match tokio::spawn(tenant.scope(task)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(label, host = %host, "Deferred task failed: {:#}", e),
        Err(e) => error!(label, host = %host, "Deferred task panicked: {}", e),
    }

    in_flight.exit();
}
