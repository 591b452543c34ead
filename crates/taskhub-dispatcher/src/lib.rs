//! TaskHub dispatcher.
//!
//! Accepts work, matches it to registered workers through a pluggable
//! [`AssignmentPolicy`], queues what cannot run yet, and records every
//! outcome in a [`StateStore`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod http;
pub mod metrics;
pub mod policy;
pub mod queue;
pub mod runtime;
pub mod status;
pub mod store;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, CANCELLED_REASON, INTERRUPTED_REASON};
pub use error::{DispatchError, ExecutionError, PersistenceError};
pub use event::DispatchEvent;
pub use policy::{AssignmentPolicy, KeywordPolicy, LeastLoadedPolicy, RoundRobinPolicy};
pub use queue::PriorityQueue;
pub use runtime::{from_fn, ExecutionContext, WorkExecutor, WorkerReport, WorkerRuntime};
pub use status::{DispatchStatus, WorkerStatusView};
pub use store::{JsonFileStore, MemoryStore, StateStore};
