//! Priority queue for work that has no eligible worker yet.

use std::collections::VecDeque;

use taskhub_core::{Priority, WorkId, WorkRecord, WorkerDescriptor, WorkerId};

use crate::policy::{select_worker, AssignmentPolicy};

/// Three FIFO bands, drained high before normal before low.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    high: VecDeque<WorkRecord>,
    normal: VecDeque<WorkRecord>,
    low: VecDeque<WorkRecord>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn band_mut(&mut self, priority: Priority) -> &mut VecDeque<WorkRecord> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    fn bands_mut(&mut self) -> [&mut VecDeque<WorkRecord>; 3] {
        [&mut self.high, &mut self.normal, &mut self.low]
    }

    /// Append to the back of the record's priority band.
    pub fn push(&mut self, work: WorkRecord) {
        self.band_mut(work.priority).push_back(work);
    }

    /// Remove the first record, by priority then arrival, that `policy`
    /// can place on one of `workers`, returning it with the chosen worker.
    ///
    /// Ineligible records are skipped, not dropped. Leaves the queue
    /// untouched when nothing is eligible.
    pub fn pop_best_for(
        &mut self,
        policy: &dyn AssignmentPolicy,
        workers: &[WorkerDescriptor],
    ) -> Option<(WorkRecord, WorkerId)> {
        for band in self.bands_mut() {
            let found = band
                .iter()
                .enumerate()
                .find_map(|(idx, work)| select_worker(policy, work, workers).map(|w| (idx, w)));

            if let Some((idx, worker_id)) = found {
                return band.remove(idx).map(|work| (work, worker_id));
            }
        }
        None
    }

    /// Put a popped record back at the head of its band.
    pub fn push_front(&mut self, work: WorkRecord) {
        self.band_mut(work.priority).push_front(work);
    }

    pub fn get(&self, id: &WorkId) -> Option<&WorkRecord> {
        self.iter().find(|w| &w.id == id)
    }

    /// Records in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkRecord> {
        self.high.iter().chain(self.normal.iter()).chain(self.low.iter())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{KeywordPolicy, LeastLoadedPolicy};
    use taskhub_core::WorkSpec;

    fn record(name: &str, priority: Priority) -> WorkRecord {
        WorkRecord::new(
            WorkSpec::new(name)
                .with_command("create_backup")
                .with_priority(priority),
        )
    }

    fn idle(id: &str, caps: &[&str]) -> WorkerDescriptor {
        WorkerDescriptor::new(
            WorkerId::new(id),
            caps.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = PriorityQueue::new();
        queue.push(record("low", Priority::Low));
        queue.push(record("high", Priority::High));
        queue.push(record("normal-1", Priority::Normal));
        queue.push(record("normal-2", Priority::Normal));

        let workers = [idle("w", &[])];
        let order: Vec<String> = std::iter::from_fn(|| {
            queue
                .pop_best_for(&LeastLoadedPolicy, &workers)
                .map(|(w, _)| w.name)
        })
        .collect();

        assert_eq!(order, ["high", "normal-1", "normal-2", "low"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_skips_ineligible_head() {
        let mut queue = PriorityQueue::new();
        queue.push(WorkRecord::new(
            WorkSpec::new("monitor first")
                .with_command("monitor_cpu")
                .with_priority(Priority::High),
        ));
        queue.push(record("backup", Priority::Low));

        let workers = [idle("file_manager", &["backup_creation"])];
        let (work, worker) = queue.pop_best_for(&KeywordPolicy, &workers).unwrap();
        assert_eq!(work.name, "backup");
        assert_eq!(worker, WorkerId::new("file_manager"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_nothing_eligible_leaves_queue_intact() {
        let mut queue = PriorityQueue::new();
        queue.push(record("a", Priority::Normal));
        queue.push(record("b", Priority::High));

        let workers = [idle("monitor", &["health_checks"])];
        assert!(queue.pop_best_for(&KeywordPolicy, &workers).is_none());

        let names: Vec<&str> = queue.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn test_push_front_restores_position() {
        let mut queue = PriorityQueue::new();
        queue.push(record("x", Priority::Normal));
        queue.push(record("y", Priority::Normal));

        let workers = [idle("w", &[])];
        let (popped, _) = queue.pop_best_for(&LeastLoadedPolicy, &workers).unwrap();
        let id = popped.id.clone();
        queue.push_front(popped);

        assert!(queue.get(&id).is_some());
        let names: Vec<&str> = queue.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
    }
}
