//! TaskHub Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - An async runtime
//! - The filesystem
//! - HTTP
//!
//! All types here describe work, workers and the persisted snapshot.

pub mod error;
pub mod ids;
pub mod snapshot;
pub mod status;
pub mod work;
pub mod worker;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{WorkId, WorkerId};
pub use snapshot::{QueueStats, StateSnapshot};
pub use status::{Priority, WorkStatus};
pub use work::{Params, WorkRecord, WorkSpec};
pub use worker::{WorkerDescriptor, WorkerSpec};
