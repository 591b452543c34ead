//! Dispatch events broadcast to presentation layers.

use serde::Serialize;
use taskhub_core::{Priority, WorkId, WorkerId};

/// One observable step in the dispatcher. Published after the state change
/// it describes has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    WorkerRegistered {
        worker_id: WorkerId,
        capabilities: Vec<String>,
    },
    WorkSubmitted {
        work_id: WorkId,
        name: String,
        priority: Priority,
    },
    WorkQueued {
        work_id: WorkId,
        pending: usize,
    },
    WorkAssigned {
        work_id: WorkId,
        worker_id: WorkerId,
    },
    WorkStarted {
        work_id: WorkId,
        worker_id: WorkerId,
    },
    WorkCompleted {
        work_id: WorkId,
        worker_id: WorkerId,
    },
    WorkFailed {
        work_id: WorkId,
        worker_id: Option<WorkerId>,
        error: String,
    },
    WorkCancelled {
        work_id: WorkId,
    },
    Restored {
        requeued: usize,
        interrupted: usize,
        history: usize,
    },
}

impl DispatchEvent {
    /// The work item this event concerns, if any.
    pub fn work_id(&self) -> Option<&WorkId> {
        match self {
            Self::WorkSubmitted { work_id, .. }
            | Self::WorkQueued { work_id, .. }
            | Self::WorkAssigned { work_id, .. }
            | Self::WorkStarted { work_id, .. }
            | Self::WorkCompleted { work_id, .. }
            | Self::WorkFailed { work_id, .. }
            | Self::WorkCancelled { work_id } => Some(work_id),
            Self::WorkerRegistered { .. } | Self::Restored { .. } => None,
        }
    }

    /// True for the events that end a record's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkCompleted { .. } | Self::WorkFailed { .. })
    }
}
