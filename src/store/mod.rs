//! Store Module - per-run result state
//!
//! Thread-safe storage for task execution results.
//! Uses DashMap for lock-free concurrent access.
//!
//! Key types:
//! - `DataStore`: Write-once storage for one run's task results
//! - `TaskResult`: Execution result with status, output, timing and provenance
//! - `TaskStatus`: Success or fallback status
//! - `FailureKind`: Why a task fell back

mod datastore;

pub use datastore::{DataStore, FailureKind, TaskResult, TaskStatus};
