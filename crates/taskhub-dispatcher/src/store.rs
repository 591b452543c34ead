//! Durable state snapshots.
//!
//! The dispatcher saves a full [`StateSnapshot`] after every mutation and
//! appends each record that reaches a terminal state to an archive, so
//! history evicted from memory stays on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use taskhub_core::{StateSnapshot, WorkRecord};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::PersistenceError;

/// Storage backend for dispatcher state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved snapshot. A store with nothing saved yields an
    /// empty snapshot rather than an error.
    async fn load(&self) -> Result<StateSnapshot, PersistenceError>;

    /// Replace the saved snapshot. Readers never observe a partial write.
    async fn save(&self, snapshot: &StateSnapshot) -> Result<(), PersistenceError>;

    /// Append a terminal record to the permanent log.
    async fn archive(&self, record: &WorkRecord) -> Result<(), PersistenceError>;
}

/// Snapshot in a single pretty-printed JSON file, terminal records in a
/// JSON-lines file beside it.
pub struct JsonFileStore {
    path: PathBuf,
    archive_path: PathBuf,
}

impl JsonFileStore {
    /// `path` is the snapshot file; the archive lives at
    /// `<path without extension>.history.jsonl`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let archive_path = path.with_extension("history.jsonl");
        Self { path, archive_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn ensure_parent(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Read back every archived record, oldest first.
    pub async fn read_archive(&self) -> Result<Vec<WorkRecord>, PersistenceError> {
        let content = match fs::read_to_string(&self.archive_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(PersistenceError::from))
            .collect()
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<StateSnapshot, PersistenceError> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StateSnapshot::default())
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(PersistenceError::Corrupt(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        let snapshot = serde_json::from_slice(&bytes)?;
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &StateSnapshot) -> Result<(), PersistenceError> {
        self.ensure_parent().await?;
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn archive(&self, record: &WorkRecord) -> Result<(), PersistenceError> {
        self.ensure_parent().await?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.archive_path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps everything in memory. Useful for tests and embedding without a disk.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<StateSnapshot>>,
    archived: Mutex<Vec<WorkRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if a previous process saved it.
    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            archived: Mutex::new(Vec::new()),
        }
    }

    pub async fn saved(&self) -> Option<StateSnapshot> {
        self.snapshot.lock().await.clone()
    }

    pub async fn archived(&self) -> Vec<WorkRecord> {
        self.archived.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<StateSnapshot, PersistenceError> {
        Ok(self.snapshot.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, snapshot: &StateSnapshot) -> Result<(), PersistenceError> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }

    async fn archive(&self, record: &WorkRecord) -> Result<(), PersistenceError> {
        self.archived.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskhub_core::{Priority, WorkSpec, WorkerId};
    use tempfile::TempDir;

    fn sample() -> StateSnapshot {
        let queued = WorkRecord::new(
            WorkSpec::new("Process Reports")
                .with_command("generate_report")
                .with_priority(Priority::Low),
        );

        let mut running = WorkRecord::new(WorkSpec::new("Backup Logs").with_command("create_backup"));
        running.mark_assigned(WorkerId::new("file_manager")).unwrap();
        running.mark_running().unwrap();

        let mut done = WorkRecord::new(WorkSpec::new("System Health Check"));
        done.mark_assigned(WorkerId::new("monitor")).unwrap();
        done.mark_running().unwrap();
        done.complete(json!({"healthy": true})).unwrap();

        let mut snapshot = StateSnapshot::default();
        snapshot.queue.push(queued);
        snapshot
            .assignments
            .insert(WorkerId::new("file_manager"), vec![running]);
        snapshot.completed.push(done);
        snapshot.stats.total_received = 3;
        snapshot.stats.total_assigned = 2;
        snapshot.stats.total_completed = 1;
        snapshot
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let snapshot = store.load().await.unwrap();
        assert!(snapshot.is_empty());
        assert!(store.read_archive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_in_fresh_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let original = sample();

        JsonFileStore::new(&path).save(&original).await.unwrap();
        let loaded = JsonFileStore::new(&path).load().await.unwrap();

        assert_eq!(loaded, original);
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_empty_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "  \n").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_truncated_file_is_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"queue\": [").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
    }

    #[tokio::test]
    async fn test_archive_appends_lines() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let snapshot = sample();
        let done = &snapshot.completed[0];

        store.archive(done).await.unwrap();
        store.archive(done).await.unwrap();

        assert_eq!(
            store.archive_path(),
            dir.path().join("state.history.jsonl").as_path()
        );
        let archived = store.read_archive().await.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0].id, done.id);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap().stats.total_received, 3);
        assert!(store.saved().await.is_some());
    }
}
