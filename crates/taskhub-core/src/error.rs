//! Core domain errors.

use thiserror::Error;

use crate::{WorkId, WorkStatus};

/// Core domain errors for taskhub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A lifecycle transition that the state machine does not allow.
    #[error("Invalid state transition for {work_id}: {from} -> {to}")]
    InvalidTransition {
        work_id: WorkId,
        from: WorkStatus,
        to: WorkStatus,
    },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
