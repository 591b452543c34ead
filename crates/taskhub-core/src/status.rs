//! Status and priority enums for work records.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Lifecycle status of a WorkRecord.
///
/// `pending -> assigned -> running -> {completed | failed}`. Assigned and
/// running work may also jump straight to `failed` when it is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    /// Created, waiting in the queue for an eligible worker.
    #[default]
    Pending,
    /// Handed to a worker; immediately followed by `Running`.
    Assigned,
    /// Executing on its worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error, timed out, or was cancelled.
    Failed,
}

impl WorkStatus {
    /// Returns true if no further transitions are permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the work is held by a worker.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }

    /// Lowercase name, as written to snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority. Ordered so that `High > Normal > Low`.
///
/// Unknown priority strings never fail: they coalesce to `Normal`, both when
/// parsed from user input and when deserialized from an older snapshot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Parse a priority, coalescing anything unrecognised to `Normal`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "normal" => Self::Normal,
            "low" => Self::Low,
            other => {
                warn!(priority = %other, "Unknown priority, defaulting to normal");
                Self::Normal
            }
        }
    }

    /// Lowercase name, as written to snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        Self::parse_lenient(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(WorkStatus::Completed.is_terminal());
        assert!(WorkStatus::Failed.is_terminal());
        assert!(!WorkStatus::Running.is_terminal());
        assert!(WorkStatus::Assigned.is_in_flight());
        assert!(!WorkStatus::Pending.is_in_flight());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_unknown_priority_coalesces_to_normal() {
        assert_eq!(Priority::from("urgent"), Priority::Normal);
        assert_eq!(Priority::from("HIGH"), Priority::High);
        assert_eq!(Priority::from(" low "), Priority::Low);
    }

    #[test]
    fn test_priority_deserialize_is_lenient() {
        let p: Priority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(p, Priority::Normal);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&WorkStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
