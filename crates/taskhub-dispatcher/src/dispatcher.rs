//! The dispatcher: owns every state transition of work and workers.
//!
//! All mutations go through one async mutex, so submission, completion
//! handling and queue draining never interleave. Executions themselves run
//! on their own tasks and re-enter the dispatcher only through the report
//! channel, which is consumed in arrival order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};

use serde_json::Value;
use taskhub_core::{
    CoreError, QueueStats, StateSnapshot, WorkId, WorkRecord, WorkSpec, WorkStatus, WorkerDescriptor,
    WorkerId, WorkerSpec,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::event::DispatchEvent;
use crate::policy::{select_worker, AssignmentPolicy, KeywordPolicy};
use crate::queue::PriorityQueue;
use crate::runtime::{WorkExecutor, WorkerReport, WorkerRuntime};
use crate::status::{DispatchStatus, WorkerStatusView};
use crate::store::{MemoryStore, StateStore};

/// Reason recorded on cancelled work.
pub const CANCELLED_REASON: &str = "cancelled";

/// Reason recorded on work that was in flight when the previous process stopped.
pub const INTERRUPTED_REASON: &str = "interrupted by dispatcher restart";

/// Where an outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportSource {
    /// The worker's own runtime: its execution has ended.
    Runtime,
    /// A caller of the public API. The execution may still be running.
    External,
}

/// Side effects collected while the state is mutated, applied before the
/// lock is released.
#[derive(Default)]
struct Changes {
    events: Vec<DispatchEvent>,
    archive: Vec<WorkRecord>,
}

struct DispatchState {
    /// Registration order. `runtimes[i]` drives `workers[i]`.
    workers: Vec<WorkerDescriptor>,
    runtimes: Vec<WorkerRuntime>,
    queue: PriorityQueue,
    active: HashMap<WorkId, WorkRecord>,
    history: VecDeque<WorkRecord>,
    history_limit: usize,
    stats: QueueStats,
}

impl DispatchState {
    fn new(history_limit: usize) -> Self {
        Self {
            workers: Vec::new(),
            runtimes: Vec::new(),
            queue: PriorityQueue::new(),
            active: HashMap::new(),
            history: VecDeque::new(),
            history_limit,
            stats: QueueStats::default(),
        }
    }

    fn worker_index(&self, id: &WorkerId) -> Option<usize> {
        self.workers.iter().position(|w| &w.id == id)
    }

    /// Ask the policy for an idle worker, discarding answers that name a
    /// worker which is unknown or busy.
    fn choose(&self, policy: &dyn AssignmentPolicy, record: &WorkRecord) -> Option<usize> {
        let worker_id = select_worker(policy, record, &self.workers)?;
        match self.worker_index(&worker_id) {
            Some(idx) if self.workers[idx].is_idle() => Some(idx),
            _ => {
                warn!(
                    work_id = %record.id,
                    worker_id = %worker_id,
                    policy = policy.name(),
                    "Policy chose an unavailable worker, ignoring"
                );
                None
            }
        }
    }

    /// `pending -> assigned -> running` on worker `idx`, in one step.
    fn start(
        &mut self,
        mut record: WorkRecord,
        idx: usize,
        changes: &mut Changes,
    ) -> Result<(), DispatchError> {
        let worker_id = self.workers[idx].id.clone();
        if let Some(current) = self.runtimes[idx].current() {
            return Err(DispatchError::WorkerBusy {
                worker_id,
                current: current.clone(),
            });
        }

        record.mark_assigned(worker_id.clone())?;
        record.mark_running()?;
        self.runtimes[idx].submit(&record)?;

        info!(
            work_id = %record.id,
            worker_id = %worker_id,
            priority = %record.priority,
            "Assigning work to worker"
        );

        let worker = &mut self.workers[idx];
        worker.busy = true;
        worker.current_work = Some(record.id.clone());
        self.stats.total_assigned += 1;

        changes.events.push(DispatchEvent::WorkAssigned {
            work_id: record.id.clone(),
            worker_id: worker_id.clone(),
        });
        changes.events.push(DispatchEvent::WorkStarted {
            work_id: record.id.clone(),
            worker_id,
        });
        self.active.insert(record.id.clone(), record);
        Ok(())
    }

    fn enqueue(&mut self, record: WorkRecord, changes: &mut Changes) {
        let work_id = record.id.clone();
        warn!(
            work_id = %work_id,
            priority = %record.priority,
            "No eligible worker, keeping work in queue"
        );
        self.queue.push(record);
        changes.events.push(DispatchEvent::WorkQueued {
            work_id,
            pending: self.queue.len(),
        });
    }

    fn submit(
        &mut self,
        spec: WorkSpec,
        policy: &dyn AssignmentPolicy,
        changes: &mut Changes,
    ) -> Result<WorkId, DispatchError> {
        spec.validate()?;
        let record = WorkRecord::new(spec);
        let work_id = record.id.clone();
        self.stats.total_received += 1;

        info!(
            work_id = %work_id,
            name = %record.name,
            priority = %record.priority,
            "Work submitted"
        );
        changes.events.push(DispatchEvent::WorkSubmitted {
            work_id: work_id.clone(),
            name: record.name.clone(),
            priority: record.priority,
        });

        match self.choose(policy, &record) {
            Some(idx) => self.start(record, idx, changes)?,
            None => self.enqueue(record, changes),
        }
        Ok(work_id)
    }

    fn register(
        &mut self,
        spec: WorkerSpec,
        runtime: impl FnOnce(WorkerId) -> WorkerRuntime,
        changes: &mut Changes,
    ) -> Result<WorkerId, DispatchError> {
        let worker_id = spec.id.unwrap_or_else(WorkerId::generate);
        if self.worker_index(&worker_id).is_some() {
            return Err(DispatchError::DuplicateWorker(worker_id));
        }

        info!(
            worker_id = %worker_id,
            capabilities = ?spec.capabilities,
            "Worker registered"
        );
        changes.events.push(DispatchEvent::WorkerRegistered {
            worker_id: worker_id.clone(),
            capabilities: spec.capabilities.clone(),
        });

        self.workers
            .push(WorkerDescriptor::new(worker_id.clone(), spec.capabilities));
        self.runtimes.push(runtime(worker_id.clone()));
        Ok(worker_id)
    }

    /// Give the worker at `idx` at most one queued record.
    fn drain(&mut self, idx: usize, policy: &dyn AssignmentPolicy, changes: &mut Changes) {
        if self.workers[idx].busy || self.queue.is_empty() {
            return;
        }
        debug!(
            worker_id = %self.workers[idx].id,
            pending = self.queue.len(),
            "Draining queue into free worker"
        );

        let candidate = self
            .queue
            .pop_best_for(policy, std::slice::from_ref(&self.workers[idx]));
        if let Some((record, _)) = candidate {
            if let Err(e) = self.start(record.clone(), idx, changes) {
                error!(work_id = %record.id, error = %e, "Failed to start queued work, requeueing");
                self.queue.push_front(record);
            }
        }
    }

    /// Move a terminal record into history, evicting the oldest beyond the limit.
    fn retire(&mut self, record: WorkRecord, changes: &mut Changes) {
        changes.archive.push(record.clone());
        self.remember(record);
    }

    fn remember(&mut self, record: WorkRecord) {
        self.history.push_back(record);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    fn find_terminal(&self, work_id: &WorkId) -> Option<&WorkRecord> {
        self.history.iter().rev().find(|r| &r.id == work_id)
    }

    /// Apply a worker's outcome for `work_id`.
    ///
    /// Only a runtime report frees the worker. An external report settles
    /// the record, signals the execution to stop and leaves the worker busy
    /// until its runtime reports.
    fn finish(
        &mut self,
        worker_id: &WorkerId,
        work_id: &WorkId,
        outcome: Result<Value, String>,
        source: ReportSource,
        policy: &dyn AssignmentPolicy,
        changes: &mut Changes,
    ) -> Result<(), DispatchError> {
        let target = match &outcome {
            Ok(_) => WorkStatus::Completed,
            Err(_) => WorkStatus::Failed,
        };

        if let Some(record) = self.active.get(work_id) {
            if record.assigned_worker.as_ref() != Some(worker_id) {
                return Err(DispatchError::NotAssigned {
                    work_id: work_id.clone(),
                    worker_id: worker_id.clone(),
                });
            }
            let idx = self
                .worker_index(worker_id)
                .ok_or_else(|| DispatchError::WorkerNotFound(worker_id.clone()))?;

            let mut record = self
                .active
                .remove(work_id)
                .ok_or_else(|| DispatchError::WorkNotFound(work_id.clone()))?;
            let applied = match outcome {
                Ok(result) => record.complete(result),
                Err(reason) => record.fail(reason),
            };
            if let Err(e) = applied {
                self.active.insert(work_id.clone(), record);
                return Err(e.into());
            }

            match &record.error {
                None => {
                    self.stats.total_completed += 1;
                    info!(work_id = %work_id, worker_id = %worker_id, "Work completed");
                    changes.events.push(DispatchEvent::WorkCompleted {
                        work_id: work_id.clone(),
                        worker_id: worker_id.clone(),
                    });
                }
                Some(reason) => {
                    self.stats.total_failed += 1;
                    error!(work_id = %work_id, worker_id = %worker_id, error = %reason, "Work failed");
                    changes.events.push(DispatchEvent::WorkFailed {
                        work_id: work_id.clone(),
                        worker_id: Some(worker_id.clone()),
                        error: reason.clone(),
                    });
                }
            }

            self.workers[idx].completed_count += 1;
            self.retire(record, changes);

            let executing = self.runtimes[idx].current() == Some(work_id);
            if source == ReportSource::External && executing {
                debug!(
                    work_id = %work_id,
                    worker_id = %worker_id,
                    "Outcome reported before execution ended, worker stays busy"
                );
                self.runtimes[idx].cancel();
            } else {
                self.release(idx, work_id);
                self.drain(idx, policy, changes);
            }
            return Ok(());
        }

        // Settled work still occupies its worker until the execution ends.
        if let Some(idx) = self
            .worker_index(worker_id)
            .filter(|_| source == ReportSource::Runtime)
        {
            if self.workers[idx].current_work.as_ref() == Some(work_id) {
                debug!(
                    work_id = %work_id,
                    worker_id = %worker_id,
                    "Execution of settled work ended, releasing worker"
                );
                self.release(idx, work_id);
                self.drain(idx, policy, changes);
                return Ok(());
            }
        }

        match self.find_terminal(work_id) {
            Some(record) => Err(CoreError::InvalidTransition {
                work_id: work_id.clone(),
                from: record.status,
                to: target,
            }
            .into()),
            None => Err(DispatchError::WorkNotFound(work_id.clone())),
        }
    }

    fn release(&mut self, idx: usize, work_id: &WorkId) {
        self.runtimes[idx].release(work_id);
        let worker = &mut self.workers[idx];
        worker.busy = false;
        worker.current_work = None;
    }

    fn cancel(&mut self, work_id: &WorkId, changes: &mut Changes) -> Result<WorkRecord, DispatchError> {
        let (mut record, holder) = if let Some(record) = self.active.remove(work_id) {
            let holder = record
                .assigned_worker
                .as_ref()
                .and_then(|w| self.worker_index(w));
            (record, holder)
        } else if let Some(record) = self
            .queue
            .get(work_id)
            .or_else(|| self.find_terminal(work_id))
        {
            return Err(CoreError::InvalidTransition {
                work_id: work_id.clone(),
                from: record.status,
                to: WorkStatus::Failed,
            }
            .into());
        } else {
            return Err(DispatchError::WorkNotFound(work_id.clone()));
        };

        if let Err(e) = record.fail(CANCELLED_REASON) {
            self.active.insert(work_id.clone(), record);
            return Err(e.into());
        }
        if let Some(idx) = holder {
            self.runtimes[idx].cancel();
        }
        self.stats.total_failed += 1;

        info!(work_id = %work_id, "Work cancelled");
        changes.events.push(DispatchEvent::WorkCancelled {
            work_id: work_id.clone(),
        });
        changes.events.push(DispatchEvent::WorkFailed {
            work_id: work_id.clone(),
            worker_id: record.assigned_worker.clone(),
            error: CANCELLED_REASON.to_string(),
        });

        self.retire(record.clone(), changes);
        Ok(record)
    }

    /// Rebuild from a saved snapshot. Queued work is requeued in order,
    /// in-flight work is failed, history is kept.
    fn recover(&mut self, snapshot: StateSnapshot, changes: &mut Changes) {
        self.stats = snapshot.stats;

        let mut history = 0;
        for record in snapshot.completed {
            if record.is_terminal() {
                self.remember(record);
                history += 1;
            } else {
                warn!(work_id = %record.id, status = %record.status, "Skipping non-terminal record in history");
            }
        }

        let mut requeued = 0;
        for record in snapshot.queue {
            if record.status == WorkStatus::Pending {
                self.queue.push(record);
                requeued += 1;
            } else {
                warn!(work_id = %record.id, status = %record.status, "Skipping non-pending record in queue");
            }
        }

        let mut interrupted = 0;
        for (worker_id, records) in snapshot.assignments {
            for mut record in records {
                match record.fail(INTERRUPTED_REASON) {
                    Ok(()) => {
                        warn!(work_id = %record.id, worker_id = %worker_id, "Work interrupted by restart");
                        self.stats.total_failed += 1;
                        changes.events.push(DispatchEvent::WorkFailed {
                            work_id: record.id.clone(),
                            worker_id: Some(worker_id.clone()),
                            error: INTERRUPTED_REASON.to_string(),
                        });
                        self.retire(record, changes);
                        interrupted += 1;
                    }
                    Err(e) => warn!(error = %e, "Skipping assignment record"),
                }
            }
        }

        info!(requeued, interrupted, history, "Restored dispatcher state");
        changes.events.push(DispatchEvent::Restored {
            requeued,
            interrupted,
            history,
        });
    }

    fn get(&self, work_id: &WorkId) -> Option<&WorkRecord> {
        self.active
            .get(work_id)
            .or_else(|| self.queue.get(work_id))
            .or_else(|| self.find_terminal(work_id))
    }

    fn snapshot(&self) -> StateSnapshot {
        let mut assignments: BTreeMap<WorkerId, Vec<WorkRecord>> = BTreeMap::new();
        for record in self.active.values() {
            if let Some(worker_id) = &record.assigned_worker {
                assignments
                    .entry(worker_id.clone())
                    .or_default()
                    .push(record.clone());
            }
        }

        StateSnapshot {
            queue: self.queue.iter().cloned().collect(),
            assignments,
            completed: self.history.iter().cloned().collect(),
            stats: self.stats,
        }
    }

    fn status(&self) -> DispatchStatus {
        DispatchStatus {
            pending_count: self.queue.len(),
            running_count: self.active.len(),
            workers: self.workers.iter().map(WorkerStatusView::from).collect(),
            completed_count: self.stats.total_completed,
            failed_count: self.stats.total_failed,
            stats: self.stats,
        }
    }
}

struct Inner {
    config: DispatcherConfig,
    policy: Arc<dyn AssignmentPolicy>,
    store: Arc<dyn StateStore>,
    state: Mutex<DispatchState>,
    reports: mpsc::UnboundedSender<WorkerReport>,
    events: broadcast::Sender<DispatchEvent>,
}

impl Inner {
    /// Persist and publish. Called with the state lock held so snapshots
    /// and events are emitted in mutation order.
    async fn commit(&self, state: &DispatchState, changes: Changes) {
        for record in &changes.archive {
            if let Err(e) = self.store.archive(record).await {
                warn!(work_id = %record.id, error = %e, "Failed to archive terminal work");
            }
        }
        if let Err(e) = self.store.save(&state.snapshot()).await {
            warn!(error = %e, "Failed to persist snapshot, continuing in memory");
        }
        for event in changes.events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    async fn finish(
        &self,
        worker_id: &WorkerId,
        work_id: &WorkId,
        outcome: Result<Value, String>,
        source: ReportSource,
    ) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        let mut changes = Changes::default();
        let result = state.finish(
            worker_id,
            work_id,
            outcome,
            source,
            self.policy.as_ref(),
            &mut changes,
        );
        if result.is_ok() {
            self.commit(&state, changes).await;
        }
        result
    }
}

/// Consume worker reports in arrival order until the dispatcher is dropped.
async fn report_loop(inner: Weak<Inner>, mut reports: mpsc::UnboundedReceiver<WorkerReport>) {
    while let Some(report) = reports.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let WorkerReport {
            worker_id,
            work_id,
            outcome,
        } = report;

        let outcome = outcome.map_err(|e| e.to_string());
        if let Err(e) = inner
            .finish(&worker_id, &work_id, outcome, ReportSource::Runtime)
            .await {
            warn!(
                work_id = %work_id,
                worker_id = %worker_id,
                error = %e,
                "Ignoring worker report"
            );
        }
    }
    debug!("Report loop stopped");
}

/// Handle to the dispatcher. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// In-memory dispatcher with the keyword policy.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_parts(config, Arc::new(KeywordPolicy), Arc::new(MemoryStore::new()))
    }

    /// Dispatcher with an explicit policy and store, starting empty.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_parts(
        config: DispatcherConfig,
        policy: Arc<dyn AssignmentPolicy>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let inner = Arc::new(Inner {
            state: Mutex::new(DispatchState::new(config.history_limit)),
            config,
            policy,
            store,
            reports: reports_tx,
            events,
        });
        tokio::spawn(report_loop(Arc::downgrade(&inner), reports_rx));

        Self { inner }
    }

    /// Dispatcher seeded from whatever `store` last saved.
    ///
    /// An unreadable snapshot is logged and treated as empty.
    pub async fn restore(
        config: DispatcherConfig,
        policy: Arc<dyn AssignmentPolicy>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let snapshot = match store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to load snapshot, starting empty");
                StateSnapshot::default()
            }
        };

        let dispatcher = Self::with_parts(config, policy, store);
        {
            let inner = &dispatcher.inner;
            let mut state = inner.state.lock().await;
            let mut changes = Changes::default();
            state.recover(snapshot, &mut changes);
            inner.commit(&state, changes).await;
        }
        dispatcher
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.policy.name()
    }

    /// Register a worker and immediately offer it one queued record.
    pub async fn register_worker(
        &self,
        spec: WorkerSpec,
        executor: Arc<dyn WorkExecutor>,
    ) -> Result<WorkerId, DispatchError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let mut changes = Changes::default();

        let reports = inner.reports.clone();
        let timeout = inner.config.execution_timeout;
        let worker_id = state.register(
            spec,
            |id| WorkerRuntime::new(id, executor, reports, timeout),
            &mut changes,
        )?;

        let idx = state.workers.len() - 1;
        state.drain(idx, inner.policy.as_ref(), &mut changes);
        inner.commit(&state, changes).await;
        Ok(worker_id)
    }

    /// Create a record and assign it right away, or queue it when no worker
    /// is eligible. Assignment completes before this returns.
    pub async fn submit_work(&self, spec: WorkSpec) -> Result<WorkId, DispatchError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let mut changes = Changes::default();
        let result = state.submit(spec, inner.policy.as_ref(), &mut changes);
        inner.commit(&state, changes).await;
        result
    }

    /// Record a successful outcome reported by `worker_id`.
    ///
    /// Fails without touching state if the work is not running on that
    /// worker, e.g. a duplicate or late report. If the execution is still
    /// running it is signalled to stop and the worker takes no new work
    /// until it has returned.
    pub async fn on_worker_completed(
        &self,
        worker_id: &WorkerId,
        work_id: &WorkId,
        result: Value,
    ) -> Result<(), DispatchError> {
        self.inner
            .finish(worker_id, work_id, Ok(result), ReportSource::External)
            .await
    }

    /// Record a failure reported by `worker_id`. Same guards as
    /// [`Dispatcher::on_worker_completed`].
    pub async fn on_worker_failed(
        &self,
        worker_id: &WorkerId,
        work_id: &WorkId,
        error: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.inner
            .finish(worker_id, work_id, Err(error.into()), ReportSource::External)
            .await
    }

    /// Fail in-flight work with reason `cancelled`. Queued work has no
    /// worker yet and is refused with an invalid transition.
    ///
    /// In-flight executions are signalled through their cancellation token;
    /// the worker stays busy until the execution returns.
    pub async fn cancel_work(&self, work_id: &WorkId) -> Result<WorkRecord, DispatchError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let mut changes = Changes::default();
        let record = state.cancel(work_id, &mut changes)?;
        inner.commit(&state, changes).await;
        Ok(record)
    }

    pub async fn get_status(&self) -> DispatchStatus {
        self.inner.state.lock().await.status()
    }

    /// Copy of a record, wherever it currently is.
    pub async fn get_work(&self, work_id: &WorkId) -> Result<WorkRecord, DispatchError> {
        self.inner
            .state
            .lock()
            .await
            .get(work_id)
            .cloned()
            .ok_or_else(|| DispatchError::WorkNotFound(work_id.clone()))
    }

    /// Copy of the full state, as it would be persisted.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.events.subscribe()
    }
}
