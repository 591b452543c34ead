//! Worker identity and capability types.

use crate::{WorkId, WorkerId};
use serde::{Deserialize, Serialize};

/// What a caller supplies when registering a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Stable id to register under; generated when absent.
    pub id: Option<WorkerId>,

    /// Capability tags, e.g. `backup_creation`.
    pub capabilities: Vec<String>,
}

impl WorkerSpec {
    /// Register under a fixed id.
    pub fn named(id: impl Into<WorkerId>) -> Self {
        Self {
            id: Some(id.into()),
            capabilities: Vec::new(),
        }
    }

    /// Builder method to add a capability tag.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Builder method to add several capability tags.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }
}

/// Live view of a registered worker, owned by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDescriptor {
    pub id: WorkerId,
    pub capabilities: Vec<String>,

    /// True iff exactly one record is in flight on this worker.
    pub busy: bool,

    /// Work currently held by the worker.
    pub current_work: Option<WorkId>,

    /// Terminal outcomes reported by this worker (success or failure).
    pub completed_count: u64,
}

impl WorkerDescriptor {
    pub fn new(id: WorkerId, capabilities: Vec<String>) -> Self {
        Self {
            id,
            capabilities,
            busy: false,
            current_work: None,
            completed_count: 0,
        }
    }

    /// Check if any capability tag contains `needle` (case-insensitive).
    pub fn has_capability_matching(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.capabilities
            .iter()
            .any(|c| c.to_lowercase().contains(&needle))
    }

    pub fn is_idle(&self) -> bool {
        !self.busy
    }
}
