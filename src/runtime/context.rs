//! Execution context - per-request state owned by one scheduler run

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::session::ChatMessage;
use crate::store::DataStore;

/// Inbound chat request payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatInput {
    /// Latest user utterance
    pub text: String,
    /// Free-form extras (preferences, response style, ...)
    #[serde(default)]
    pub payload: Value,
    /// Recent conversation, oldest first
    #[serde(default)]
    pub recent: Vec<ChatMessage>,
}

impl ChatInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_recent(mut self, recent: Vec<ChatMessage>) -> Self {
        self.recent = recent;
        self
    }

    /// Keep only the `cap` most recent messages
    pub fn cap_recent(&mut self, cap: usize) {
        let excess = self.recent.len().saturating_sub(cap);
        if excess > 0 {
            self.recent.drain(..excess);
        }
    }
}

/// Per-request execution state
///
/// Owned by the scheduler run that created it and dropped when the run ends.
pub struct ExecutionContext {
    pub workflow: Arc<str>,
    pub session_id: Arc<str>,
    pub correlation_id: Arc<str>,
    pub input: Arc<ChatInput>,
    /// Task results accumulated as tasks complete (write-once)
    pub results: DataStore,
    cancel: CancellationToken,
    started: Instant,
}

impl ExecutionContext {
    pub fn new(
        workflow: impl Into<Arc<str>>,
        session_id: impl Into<Arc<str>>,
        mut input: ChatInput,
        recent_cap: usize,
        cancel: CancellationToken,
    ) -> Self {
        input.cap_recent(recent_cap);
        Self {
            workflow: workflow.into(),
            session_id: session_id.into(),
            correlation_id: Arc::from(uuid::Uuid::new_v4().to_string()),
            input: Arc::new(input),
            results: DataStore::new(),
            cancel,
            started: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Outputs (real or fallback) of the given tasks that have a result
    pub fn dependency_outputs(&self, deps: &[String]) -> FxHashMap<Arc<str>, Arc<Value>> {
        deps.iter()
            .filter_map(|dep| {
                self.results
                    .get_output(dep)
                    .map(|out| (Arc::from(dep.as_str()), out))
            })
            .collect()
    }

    /// True when every listed dependency succeeded for real
    pub fn dependencies_succeeded(&self, deps: &[String]) -> bool {
        deps.iter().all(|dep| self.results.is_success(dep))
    }
}
