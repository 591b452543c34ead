//! Dispatcher configuration.

use std::time::Duration;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Terminal records kept in memory; older ones live only in the archive.
    pub history_limit: usize,

    /// Upper bound on a single execution. `None` lets executors run forever.
    pub execution_timeout: Option<Duration>,

    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            history_limit: 1000,
            execution_timeout: None,
            event_capacity: 256,
        }
    }
}

impl DispatcherConfig {
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}
