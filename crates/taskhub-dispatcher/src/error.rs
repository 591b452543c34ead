//! Dispatcher error types.

use std::time::Duration;

use taskhub_core::{CoreError, WorkId, WorkerId};
use thiserror::Error;

/// Errors surfaced by dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Worker {worker_id} is busy with {current}")]
    WorkerBusy { worker_id: WorkerId, current: WorkId },

    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Worker already registered: {0}")]
    DuplicateWorker(WorkerId),

    #[error("Work not found: {0}")]
    WorkNotFound(WorkId),

    #[error("Work {work_id} is not held by worker {worker_id}")]
    NotAssigned { work_id: WorkId, worker_id: WorkerId },

    /// Rejected lifecycle transition or invalid submission.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Snapshot read/write failures. Logged by the dispatcher, never fatal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

/// What a pluggable executor reports instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Failed(String),

    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("executor panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
