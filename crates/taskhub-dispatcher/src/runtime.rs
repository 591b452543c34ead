//! Worker runtimes: run one piece of work at a time and report back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use taskhub_core::{Params, WorkId, WorkRecord, WorkerId};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DispatchError, ExecutionError};

/// Everything an executor gets to see of a work record.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub work_id: WorkId,
    pub worker_id: WorkerId,
    pub command: Option<String>,
    pub params: Params,

    /// Triggered when the work is cancelled or its timeout elapses.
    pub cancel: CancellationToken,
}

/// The pluggable body of a worker.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> Result<Value, ExecutionError>;
}

/// Executor backed by an async closure.
pub struct FnExecutor<F> {
    f: F,
}

/// Wrap an async closure as a [`WorkExecutor`].
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn WorkExecutor>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    Arc::new(FnExecutor { f })
}

#[async_trait]
impl<F, Fut> WorkExecutor for FnExecutor<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    async fn execute(&self, ctx: ExecutionContext) -> Result<Value, ExecutionError> {
        (self.f)(ctx).await
    }
}

/// Outcome of one execution, sent from a runtime to the dispatcher.
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub work_id: WorkId,
    pub outcome: Result<Value, ExecutionError>,
}

struct InFlight {
    work_id: WorkId,
    cancel: CancellationToken,
}

/// Drives a single worker. Holds at most one in-flight record.
pub struct WorkerRuntime {
    worker_id: WorkerId,
    executor: Arc<dyn WorkExecutor>,
    reports: mpsc::UnboundedSender<WorkerReport>,
    timeout: Option<Duration>,
    in_flight: Option<InFlight>,
}

impl WorkerRuntime {
    pub fn new(
        worker_id: WorkerId,
        executor: Arc<dyn WorkExecutor>,
        reports: mpsc::UnboundedSender<WorkerReport>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            worker_id,
            executor,
            reports,
            timeout,
            in_flight: None,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn current(&self) -> Option<&WorkId> {
        self.in_flight.as_ref().map(|f| &f.work_id)
    }

    /// Start executing `work` in the background.
    ///
    /// Returns immediately. Exactly one [`WorkerReport`] is sent for every
    /// accepted submission. Must be called within a Tokio runtime.
    pub fn submit(&mut self, work: &WorkRecord) -> Result<(), DispatchError> {
        if let Some(current) = &self.in_flight {
            return Err(DispatchError::WorkerBusy {
                worker_id: self.worker_id.clone(),
                current: current.work_id.clone(),
            });
        }

        let cancel = CancellationToken::new();
        let ctx = ExecutionContext {
            work_id: work.id.clone(),
            worker_id: self.worker_id.clone(),
            command: work.command.clone(),
            params: work.params.clone(),
            cancel: cancel.clone(),
        };

        self.in_flight = Some(InFlight {
            work_id: work.id.clone(),
            cancel,
        });

        let executor = Arc::clone(&self.executor);
        let reports = self.reports.clone();
        let timeout = self.timeout;
        let worker_id = self.worker_id.clone();
        let work_id = work.id.clone();

        tokio::spawn(async move {
            let outcome = run_guarded(executor, ctx, timeout).await;
            debug!(work_id = %work_id, worker_id = %worker_id, ok = outcome.is_ok(), "Execution finished");
            if reports
                .send(WorkerReport {
                    worker_id,
                    work_id,
                    outcome,
                })
                .is_err()
            {
                warn!("Dispatcher gone, dropping worker report");
            }
        });

        Ok(())
    }

    /// Signal the in-flight execution to stop. The worker stays busy until
    /// the execution actually reports back.
    pub fn cancel(&self) {
        if let Some(current) = &self.in_flight {
            current.cancel.cancel();
        }
    }

    /// Clear the in-flight slot if it holds `work_id`.
    pub fn release(&mut self, work_id: &WorkId) -> bool {
        match &self.in_flight {
            Some(current) if &current.work_id == work_id => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }
}

/// Run the executor in its own task so panics and timeouts become failures.
async fn run_guarded(
    executor: Arc<dyn WorkExecutor>,
    ctx: ExecutionContext,
    timeout: Option<Duration>,
) -> Result<Value, ExecutionError> {
    let cancel = ctx.cancel.clone();
    let mut handle = tokio::spawn(async move { executor.execute(ctx).await });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                handle.abort();
                return Err(ExecutionError::TimedOut(limit));
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| Err(join_error(e)))
}

fn join_error(err: JoinError) -> ExecutionError {
    if err.is_cancelled() {
        return ExecutionError::Cancelled;
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ExecutionError::Panicked(message)
}
