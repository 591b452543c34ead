//! Read-only status views handed to callers.

use serde::Serialize;
use taskhub_core::{QueueStats, StateSnapshot, WorkId, WorkerDescriptor, WorkerId};

/// Point-in-time status of a single worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusView {
    pub id: WorkerId,
    pub capabilities: Vec<String>,
    pub busy: bool,
    pub completed_count: u64,
    pub current_work: Option<WorkId>,
}

impl From<&WorkerDescriptor> for WorkerStatusView {
    fn from(w: &WorkerDescriptor) -> Self {
        Self {
            id: w.id.clone(),
            capabilities: w.capabilities.clone(),
            busy: w.busy,
            completed_count: w.completed_count,
            current_work: w.current_work.clone(),
        }
    }
}

/// Copy of the dispatcher's counters. Never references live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStatus {
    pub pending_count: usize,
    pub running_count: usize,
    #[serde(rename = "perWorkerStatus")]
    pub workers: Vec<WorkerStatusView>,
    pub completed_count: u64,
    pub failed_count: u64,
    pub stats: QueueStats,
}

impl DispatchStatus {
    pub fn worker(&self, id: &WorkerId) -> Option<&WorkerStatusView> {
        self.workers.iter().find(|w| &w.id == id)
    }

    pub fn busy_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.busy).count()
    }

    /// Status as recorded in a saved snapshot, for inspecting a state file
    /// without starting a dispatcher. Only workers that held work are known.
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let workers = snapshot
            .assignments
            .iter()
            .map(|(id, records)| WorkerStatusView {
                id: id.clone(),
                capabilities: Vec::new(),
                busy: !records.is_empty(),
                completed_count: snapshot
                    .completed
                    .iter()
                    .filter(|r| r.assigned_worker.as_ref() == Some(id))
                    .count() as u64,
                current_work: records.first().map(|r| r.id.clone()),
            })
            .collect();

        Self {
            pending_count: snapshot.queue.len(),
            running_count: snapshot.in_flight_count(),
            workers,
            completed_count: snapshot.stats.total_completed,
            failed_count: snapshot.stats.total_failed,
            stats: snapshot.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhub_core::{WorkRecord, WorkSpec};

    #[test]
    fn test_from_snapshot_counts() {
        let mut running = WorkRecord::new(WorkSpec::new("Backup Logs"));
        running.mark_assigned(WorkerId::new("file_manager")).unwrap();
        running.mark_running().unwrap();

        let mut snapshot = StateSnapshot::default();
        snapshot.queue.push(WorkRecord::new(WorkSpec::new("Process Reports")));
        snapshot
            .assignments
            .insert(WorkerId::new("file_manager"), vec![running.clone()]);
        snapshot.stats.total_received = 2;
        snapshot.stats.total_assigned = 1;

        let status = DispatchStatus::from_snapshot(&snapshot);
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.running_count, 1);
        assert_eq!(status.busy_workers(), 1);

        let worker = status.worker(&WorkerId::new("file_manager")).unwrap();
        assert_eq!(worker.current_work, Some(running.id));
        assert_eq!(worker.completed_count, 0);
    }
}
