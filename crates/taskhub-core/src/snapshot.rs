//! The persisted state document.

use crate::{WorkRecord, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running totals kept alongside the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    #[serde(default)]
    pub total_received: u64,
    #[serde(default)]
    pub total_assigned: u64,
    #[serde(default)]
    pub total_completed: u64,
    #[serde(default)]
    pub total_failed: u64,
}

/// Point-in-time copy of the dispatcher's state.
///
/// Serialized with top-level keys `queue`, `assignments`, `completed` and
/// `stats`. `queue` is in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub queue: Vec<WorkRecord>,

    /// In-flight records keyed by the worker holding them.
    #[serde(default)]
    pub assignments: BTreeMap<WorkerId, Vec<WorkRecord>>,

    /// Terminal records, oldest first.
    #[serde(default)]
    pub completed: Vec<WorkRecord>,

    #[serde(default)]
    pub stats: QueueStats,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.assignments.is_empty() && self.completed.is_empty()
    }

    /// Number of records currently held by workers.
    pub fn in_flight_count(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }
}
