//! DataStore - per-run task result storage with DashMap
//!
//! Results are write-once: the first `TaskResult` recorded for a task wins,
//! later inserts are rejected so no task can overwrite another's result.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::ast::FallbackSpec;

/// Why a task fell back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Exceeded its timeout
    #[serde(rename = "task_timeout")]
    Timeout,
    /// Body returned an error
    #[serde(rename = "task_error")]
    Error,
    /// Session breaker open; body not invoked
    CircuitOpen,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "task_timeout",
            Self::Error => "task_error",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    /// Fallback output substituted
    Failed {
        kind: FailureKind,
        message: String,
        authoritative: bool,
    },
}

fn duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Task execution result (immutable once stored)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_name: Arc<str>,
    /// Output as JSON Value (Arc for O(1) cloning into dependents)
    pub output: Arc<Value>,
    #[serde(rename = "duration_ms", serialize_with = "duration_ms")]
    pub duration: Duration,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub served_from_cache: bool,
    /// Backing implementation that produced the output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Arc<str>>,
}

impl TaskResult {
    /// Create a successful result
    pub fn success(
        task_name: Arc<str>,
        output: Arc<Value>,
        duration: Duration,
        provider: Option<Arc<str>>,
    ) -> Self {
        Self {
            task_name,
            output,
            duration,
            status: TaskStatus::Success,
            served_from_cache: false,
            provider,
        }
    }

    /// Create a result synthesized from a cache hit
    pub fn from_cache(
        task_name: Arc<str>,
        output: Arc<Value>,
        duration: Duration,
        provider: Option<Arc<str>>,
    ) -> Self {
        Self {
            served_from_cache: true,
            ..Self::success(task_name, output, duration, provider)
        }
    }

    /// Create a fallback result
    pub fn fallback(
        task_name: Arc<str>,
        fallback: &FallbackSpec,
        kind: FailureKind,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            task_name,
            output: Arc::new(fallback.output.clone()),
            duration,
            status: TaskStatus::Failed {
                kind,
                message: message.into(),
                authoritative: fallback.authoritative,
            },
            served_from_cache: false,
            provider: None,
        }
    }

    /// Check if task succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Success)
    }

    /// Get error message if failed
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { message, .. } => Some(message),
            TaskStatus::Success => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            TaskStatus::Failed { kind, .. } => Some(*kind),
            TaskStatus::Success => None,
        }
    }

    /// Fell back to a default that must not be presented as a real answer
    pub fn is_non_authoritative(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Failed {
                authoritative: false,
                ..
            }
        )
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Get output as string (zero-copy for String values)
    pub fn output_str(&self) -> Cow<'_, str> {
        match &*self.output {
            Value::String(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        }
    }
}

/// Thread-safe storage for task results (lock-free)
///
/// Uses Arc<str> keys for zero-cost cloning with same Arc used in events.
#[derive(Clone, Default)]
pub struct DataStore {
    /// Task results: task name → TaskResult
    results: Arc<DashMap<Arc<str>, TaskResult>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task result if none exists yet.
    ///
    /// Returns `false` (and keeps the existing result) on a second write.
    pub fn insert(&self, result: TaskResult) -> bool {
        match self.results.entry(Arc::clone(&result.task_name)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(result);
                true
            }
        }
    }

    /// Get a task result
    pub fn get(&self, task_name: &str) -> Option<TaskResult> {
        self.results.get(task_name).map(|r| r.value().clone())
    }

    /// Check if task exists
    pub fn contains(&self, task_name: &str) -> bool {
        self.results.contains_key(task_name)
    }

    /// Check if task succeeded
    pub fn is_success(&self, task_name: &str) -> bool {
        self.get(task_name).is_some_and(|r| r.is_success())
    }

    /// Get just the output Value for a task
    /// Returns Arc<Value> for O(1) cloning instead of deep copy
    pub fn get_output(&self, task_name: &str) -> Option<Arc<Value>> {
        self.results.get(task_name).map(|r| Arc::clone(&r.output))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Ordered copy of every result
    pub fn snapshot(&self) -> BTreeMap<String, TaskResult> {
        self.results
            .iter()
            .map(|r| (r.key().to_string(), r.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(name: &str, output: Value) -> TaskResult {
        TaskResult::success(
            Arc::from(name),
            Arc::new(output),
            Duration::from_millis(5),
            None,
        )
    }

    #[test]
    fn insert_and_get_result() {
        let store = DataStore::new();
        assert!(store.insert(ok("emotion", json!({"label": "joy"}))));

        let result = store.get("emotion").unwrap();
        assert!(result.is_success());
        assert_eq!(result.output["label"], "joy");
        assert!(!result.served_from_cache);
    }

    #[test]
    fn results_are_write_once() {
        let store = DataStore::new();
        assert!(store.insert(ok("emotion", json!("first"))));
        assert!(!store.insert(ok("emotion", json!("second"))));
        assert_eq!(store.get("emotion").unwrap().output_str(), "first");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fallback_result_carries_kind_and_authority() {
        let result = TaskResult::fallback(
            Arc::from("recall"),
            &FallbackSpec::non_authoritative(json!([])),
            FailureKind::Timeout,
            "timed out after 10ms",
            Duration::from_millis(10),
        );

        assert!(!result.is_success());
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
        assert_eq!(result.error(), Some("timed out after 10ms"));
        assert!(result.is_non_authoritative());
        assert_eq!(*result.output, json!([]));
    }

    #[test]
    fn cache_hit_result_is_flagged() {
        let result = TaskResult::from_cache(
            Arc::from("emotion"),
            Arc::new(json!("joy")),
            Duration::ZERO,
            Some(Arc::from("stub")),
        );
        assert!(result.is_success());
        assert!(result.served_from_cache);
        assert_eq!(result.provider.as_deref(), Some("stub"));
    }

    #[test]
    fn serializes_flat_shape() {
        let result = TaskResult::fallback(
            Arc::from("tips"),
            &FallbackSpec::authoritative(json!("breathe")),
            FailureKind::Error,
            "boom",
            Duration::from_millis(42),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["task_name"], "tips");
        assert_eq!(value["duration_ms"], 42);
        assert_eq!(value["status"], "failed");
        assert_eq!(value["kind"], "task_error");
        assert_eq!(value["kind"], FailureKind::Error.as_str());
        assert_eq!(value["served_from_cache"], false);
        assert!(value.get("provider").is_none());
    }

    #[test]
    fn snapshot_is_sorted() {
        let store = DataStore::new();
        store.insert(ok("style", json!(1)));
        store.insert(ok("emotion", json!(2)));
        let keys: Vec<_> = store.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["emotion", "style"]);
    }

    #[test]
    fn concurrent_writes_all_stored() {
        use std::thread;

        let store = Arc::new(DataStore::new());

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.insert(ok(&format!("task_{}", i), json!({"index": i})));
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        for i in 0..100 {
            assert!(store.contains(&format!("task_{}", i)));
        }
    }
}
