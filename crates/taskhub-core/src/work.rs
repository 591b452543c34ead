//! Work submission and lifecycle types.

use crate::{CoreError, Priority, WorkId, WorkStatus, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque key/value payload handed to the executor untouched.
pub type Params = BTreeMap<String, Value>;

/// Descriptor for a submission: what the caller wants done.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Discriminator used by keyword assignment and by executors.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub params: Params,

    /// Bypasses the assignment policy when set.
    #[serde(default)]
    pub target_worker: Option<WorkerId>,
}

impl WorkSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_target(mut self, worker: impl Into<WorkerId>) -> Self {
        self.target_worker = Some(worker.into());
        self
    }

    /// Reject submissions that cannot be displayed or matched.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidInput("work name must not be empty".into()));
        }
        Ok(())
    }
}

/// A single unit of work and its lifecycle state.
///
/// Status only moves through the guarded methods below, which refuse any
/// transition out of a terminal state. `result` is set iff completed,
/// `error` iff failed, and `assigned_worker` is never cleared once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRecord {
    pub id: WorkId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub params: Params,
    pub status: WorkStatus,
    #[serde(default)]
    pub assigned_worker: Option<WorkerId>,
    #[serde(default)]
    pub target_worker: Option<WorkerId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkRecord {
    /// Create a pending record from a submission with a fresh id.
    pub fn new(spec: WorkSpec) -> Self {
        Self {
            id: WorkId::generate(),
            name: spec.name,
            description: spec.description,
            command: spec.command,
            priority: spec.priority,
            params: spec.params,
            status: WorkStatus::Pending,
            assigned_worker: None,
            target_worker: spec.target_worker,
            created_at: Utc::now(),
            assigned_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Text the keyword policy matches against: the command, or the name
    /// and description when no command was given.
    pub fn match_text(&self) -> String {
        match self.command.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => cmd.to_string(),
            _ => format!("{} {}", self.name, self.description),
        }
    }

    fn guard(&self, allowed: &[WorkStatus], to: WorkStatus) -> Result<(), CoreError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                work_id: self.id.clone(),
                from: self.status,
                to,
            })
        }
    }

    /// `pending -> assigned`.
    pub fn mark_assigned(&mut self, worker: WorkerId) -> Result<(), CoreError> {
        self.guard(&[WorkStatus::Pending], WorkStatus::Assigned)?;
        self.status = WorkStatus::Assigned;
        self.assigned_worker = Some(worker);
        self.assigned_at = Some(Utc::now());
        Ok(())
    }

    /// `assigned -> running`.
    pub fn mark_running(&mut self) -> Result<(), CoreError> {
        self.guard(&[WorkStatus::Assigned], WorkStatus::Running)?;
        self.status = WorkStatus::Running;
        Ok(())
    }

    /// `running -> completed`.
    pub fn complete(&mut self, result: Value) -> Result<(), CoreError> {
        self.guard(&[WorkStatus::Running], WorkStatus::Completed)?;
        self.status = WorkStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        Ok(())
    }

    /// `assigned | running -> failed`. Pending work has no worker to fail on.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.guard(
            &[WorkStatus::Assigned, WorkStatus::Running],
            WorkStatus::Failed,
        )?;
        self.status = WorkStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }
}
