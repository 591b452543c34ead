//! Assignment policies: which idle worker should take a piece of work.

use std::sync::atomic::{AtomicUsize, Ordering};

use taskhub_core::{WorkRecord, WorkerDescriptor, WorkerId};

/// Maps a record and the registered workers to a worker choice.
///
/// `workers` is in registration order. Implementations must only return an
/// idle worker; returning `None` means the work is queued.
pub trait AssignmentPolicy: Send + Sync {
    fn select(&self, work: &WorkRecord, workers: &[WorkerDescriptor]) -> Option<WorkerId>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Resolve a worker for `work`, letting `target_worker` short-circuit the policy.
///
/// A targeted record is only ever eligible for its target, and only while
/// that worker exists and is idle.
pub fn select_worker(
    policy: &dyn AssignmentPolicy,
    work: &WorkRecord,
    workers: &[WorkerDescriptor],
) -> Option<WorkerId> {
    match &work.target_worker {
        Some(target) => workers
            .iter()
            .find(|w| &w.id == target && w.is_idle())
            .map(|w| w.id.clone()),
        None => policy.select(work, workers),
    }
}

/// Split free text into lowercase keywords of three characters or more.
fn keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Default policy: keyword substring match against capability tags.
///
/// The record's command (or name and description when there is no command)
/// is split into keywords; a worker matches when any keyword is contained in
/// one of its tags, e.g. `create_backup` matches `backup_creation`. Among
/// matching idle workers the one with the fewest completions wins, ties
/// going to the earliest registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordPolicy;

impl AssignmentPolicy for KeywordPolicy {
    fn select(&self, work: &WorkRecord, workers: &[WorkerDescriptor]) -> Option<WorkerId> {
        let words = keywords(&work.match_text());
        if words.is_empty() {
            return None;
        }

        workers
            .iter()
            .filter(|w| w.is_idle())
            .filter(|w| words.iter().any(|k| w.has_capability_matching(k)))
            .min_by_key(|w| w.completed_count)
            .map(|w| w.id.clone())
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Any idle worker, fewest completions first.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoadedPolicy;

impl AssignmentPolicy for LeastLoadedPolicy {
    fn select(&self, _work: &WorkRecord, workers: &[WorkerDescriptor]) -> Option<WorkerId> {
        workers
            .iter()
            .filter(|w| w.is_idle())
            .min_by_key(|w| w.completed_count)
            .map(|w| w.id.clone())
    }

    fn name(&self) -> &'static str {
        "least-loaded"
    }
}

/// Rotates through workers in registration order, skipping busy ones.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    cursor: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentPolicy for RoundRobinPolicy {
    fn select(&self, _work: &WorkRecord, workers: &[WorkerDescriptor]) -> Option<WorkerId> {
        if workers.is_empty() {
            return None;
        }
        let start = self.cursor.load(Ordering::Relaxed) % workers.len();
        for offset in 0..workers.len() {
            let idx = (start + offset) % workers.len();
            if workers[idx].is_idle() {
                self.cursor.store(idx + 1, Ordering::Relaxed);
                return Some(workers[idx].id.clone());
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhub_core::WorkSpec;

    fn worker(id: &str, caps: &[&str]) -> WorkerDescriptor {
        WorkerDescriptor::new(
            WorkerId::new(id),
            caps.iter().map(|c| c.to_string()).collect(),
        )
    }

    fn demo_workers() -> Vec<WorkerDescriptor> {
        vec![
            worker(
                "data_processor",
                &["json_parsing", "data_transformation", "report_generation"],
            ),
            worker(
                "file_manager",
                &["file_operations", "backup_creation", "cleanup_operations"],
            ),
            worker(
                "monitor",
                &["system_monitoring", "alert_generation", "health_checks"],
            ),
        ]
    }

    fn work(command: &str) -> WorkRecord {
        WorkRecord::new(WorkSpec::new("w").with_command(command))
    }

    #[test]
    fn test_keyword_matches_capabilities() {
        let workers = demo_workers();
        let policy = KeywordPolicy;

        assert_eq!(
            policy.select(&work("create_backup"), &workers),
            Some(WorkerId::new("file_manager"))
        );
        assert_eq!(
            policy.select(&work("check_health"), &workers),
            Some(WorkerId::new("monitor"))
        );
        assert_eq!(
            policy.select(&work("generate_report"), &workers),
            Some(WorkerId::new("data_processor"))
        );
        assert_eq!(policy.select(&work("launch_rocket"), &workers), None);
    }

    #[test]
    fn test_keyword_uses_name_without_command() {
        let workers = demo_workers();
        let record = WorkRecord::new(
            WorkSpec::new("Nightly Backup").with_description("archive the logs"),
        );
        assert_eq!(
            KeywordPolicy.select(&record, &workers),
            Some(WorkerId::new("file_manager"))
        );
    }

    #[test]
    fn test_keyword_skips_busy_and_prefers_least_loaded() {
        let mut workers = vec![
            worker("a", &["backup_creation"]),
            worker("b", &["backup_creation"]),
            worker("c", &["backup_creation"]),
        ];
        workers[0].completed_count = 5;
        workers[1].completed_count = 2;
        workers[2].completed_count = 2;

        assert_eq!(
            KeywordPolicy.select(&work("backup"), &workers),
            Some(WorkerId::new("b"))
        );

        workers[1].busy = true;
        assert_eq!(
            KeywordPolicy.select(&work("backup"), &workers),
            Some(WorkerId::new("c"))
        );
    }

    #[test]
    fn test_target_override() {
        let mut workers = demo_workers();
        let record = WorkRecord::new(
            WorkSpec::new("w")
                .with_command("create_backup")
                .with_target("monitor"),
        );
        assert_eq!(
            select_worker(&KeywordPolicy, &record, &workers),
            Some(WorkerId::new("monitor"))
        );

        workers[2].busy = true;
        assert_eq!(select_worker(&KeywordPolicy, &record, &workers), None);

        let missing = WorkRecord::new(WorkSpec::new("w").with_target("nobody"));
        assert_eq!(select_worker(&KeywordPolicy, &missing, &workers), None);
    }

    #[test]
    fn test_round_robin_rotates() {
        let workers = vec![worker("a", &[]), worker("b", &[])];
        let policy = RoundRobinPolicy::new();
        let record = work("anything");

        assert_eq!(policy.select(&record, &workers), Some(WorkerId::new("a")));
        assert_eq!(policy.select(&record, &workers), Some(WorkerId::new("b")));
        assert_eq!(policy.select(&record, &workers), Some(WorkerId::new("a")));
    }

    #[test]
    fn test_least_loaded_ignores_capabilities() {
        let mut workers = vec![worker("a", &[]), worker("b", &[])];
        workers[0].completed_count = 1;
        assert_eq!(
            LeastLoadedPolicy.select(&work("x"), &workers),
            Some(WorkerId::new("b"))
        );
    }
}
