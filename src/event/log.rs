//! EventLog - run progress events
//!
//! - Event: envelope with id + elapsed time + kind
//! - EventKind: the five progress phases of a run
//! - EventLog: thread-safe, append-only log used by synchronous callers

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::Serialize;
use serde_json::Value;

use crate::runtime::RunStatus;

/// Single progress event of one run
///
/// Serializes flat: `{"id":0,"elapsed_ms":1,"phase":"task_start",...}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    /// Monotonic sequence ID within the run (emission order)
    pub id: u64,
    /// Time since run start (ms)
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event phases
///
/// Uses Arc<str> for task names to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EventKind {
    Start {
        workflow: Arc<str>,
        session_id: Arc<str>,
        correlation_id: Arc<str>,
        task_count: usize,
    },
    TaskStart {
        task_name: Arc<str>,
        level: usize,
    },
    TaskEnd {
        task_name: Arc<str>,
        success: bool,
        served_from_cache: bool,
        duration_ms: u64,
        output: Arc<Value>,
    },
    /// A task fell back, or the run was cancelled (`task_name` = None)
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_name: Option<Arc<str>>,
        kind: String,
        message: String,
    },
    Complete {
        status: RunStatus,
        total_duration_ms: u64,
        output: Arc<Value>,
    },
}

impl EventKind {
    /// Task name if event is task-related
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::TaskStart { task_name, .. } | Self::TaskEnd { task_name, .. } => Some(task_name),
            Self::Error { task_name, .. } => task_name.as_deref(),
            Self::Start { .. } | Self::Complete { .. } => None,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::TaskStart { .. } => "task_start",
            Self::TaskEnd { .. } => "task_end",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }

    /// Cancellation notice delivered to stream consumers
    pub fn run_cancelled(workflow: &str) -> Self {
        Self::Error {
            task_name: None,
            kind: "run_cancelled".to_string(),
            message: format!("run of workflow '{}' was cancelled", workflow),
        }
    }

    pub fn is_run_cancelled(&self) -> bool {
        matches!(self, Self::Error { task_name: None, kind, .. } if kind == "run_cancelled")
    }
}

/// Thread-safe, append-only event log
///
/// Ids are assigned under the write lock, so id order equals vector order.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
}

impl EventLog {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Log whose elapsed times count from `start_time`
    pub fn starting_at(start_time: Instant) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time,
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let mut events = self.events.write();
        let id = events.len() as u64;
        events.push(Event {
            id,
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one task
    pub fn filter_task(&self, task_name: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.task_name() == Some(task_name))
                .cloned()
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
