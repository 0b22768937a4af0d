//! Fallback policy
//!
//! Per task: a failed or timed-out invocation is replaced by the task's
//! configured fallback output so dependents can proceed. Per session: a
//! circuit breaker per (session, task) skips the body entirely after
//! repeated failures until its cooldown elapses.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::warn;

use crate::dag::PlannedTask;
use crate::error::{DuckflowError, Result};
use crate::store::{FailureKind, TaskResult};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// An open breaker, as reported by health checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenCircuit {
    pub session_id: String,
    pub task: String,
    pub remaining_ms: u64,
}

/// Breakers keyed by session, then task
pub struct SessionBreaker {
    config: CircuitBreakerConfig,
    sessions: DashMap<Arc<str>, FxHashMap<Arc<str>, Arc<CircuitBreaker>>>,
}

impl SessionBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    fn breaker(&self, session_id: &str, task: &str) -> Option<Arc<CircuitBreaker>> {
        self.sessions
            .get(session_id)
            .and_then(|tasks| tasks.get(task).cloned())
    }

    /// Whether the task body may run for this session
    pub fn allow(&self, session_id: &str, task: &str) -> bool {
        self.breaker(session_id, task)
            .is_none_or(|breaker| breaker.allow_request())
    }

    pub fn state(&self, session_id: &str, task: &str) -> CircuitState {
        self.breaker(session_id, task)
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    pub fn record_success(&self, session_id: &str, task: &str) {
        if let Some(mut tasks) = self.sessions.get_mut(session_id) {
            tasks.remove(task);
        }
        self.sessions.remove_if(session_id, |_, tasks| tasks.is_empty());
    }

    /// Count a failure; returns the resulting state
    pub fn record_failure(&self, session_id: &str, task: &str) -> CircuitState {
        let breaker = {
            let mut tasks = self.sessions.entry(Arc::from(session_id)).or_default();
            Arc::clone(
                tasks
                    .entry(Arc::from(task))
                    .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config))),
            )
        };
        breaker.record_failure()
    }

    /// Forget every breaker of a session
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Breakers currently refusing invocations, sorted
    pub fn open_circuits(&self) -> Vec<OpenCircuit> {
        let mut open: Vec<OpenCircuit> = self
            .sessions
            .iter()
            .flat_map(|entry| {
                let session = entry.key().to_string();
                entry
                    .value()
                    .iter()
                    .filter(|(_, breaker)| breaker.state() == CircuitState::Open)
                    .filter_map(|(task, breaker)| {
                        breaker.remaining_cooldown().map(|left| OpenCircuit {
                            session_id: session.clone(),
                            task: task.to_string(),
                            remaining_ms: left.as_millis() as u64,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        open.sort_by(|a, b| (&a.session_id, &a.task).cmp(&(&b.session_id, &b.task)));
        open
    }
}

/// Degrade-to-default behavior for failed task invocations
pub struct FallbackPolicy {
    breakers: SessionBreaker,
}

impl FallbackPolicy {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: SessionBreaker::new(config),
        }
    }

    pub fn breakers(&self) -> &SessionBreaker {
        &self.breakers
    }

    /// Fail with `CircuitOpen` if the session's breaker for this task is open
    pub fn check(&self, session_id: &str, task: &str) -> Result<()> {
        if self.breakers.allow(session_id, task) {
            Ok(())
        } else {
            Err(DuckflowError::CircuitOpen {
                task: task.to_string(),
                session: session_id.to_string(),
            })
        }
    }

    pub fn record_success(&self, session_id: &str, task: &str) {
        self.breakers.record_success(session_id, task);
    }

    /// Turn a task error into its fallback result.
    ///
    /// Real failures (timeout, body error) count toward the breaker;
    /// a skipped invocation does not.
    pub fn recover(
        &self,
        task: &PlannedTask,
        session_id: &str,
        error: &DuckflowError,
        duration: Duration,
    ) -> TaskResult {
        let kind = match error {
            DuckflowError::TaskTimeout { .. } => FailureKind::Timeout,
            DuckflowError::CircuitOpen { .. } => FailureKind::CircuitOpen,
            _ => FailureKind::Error,
        };

        if kind != FailureKind::CircuitOpen {
            let state = self.breakers.record_failure(session_id, &task.name);
            if state == CircuitState::Open {
                warn!(
                    task = %task.name,
                    session = session_id,
                    "circuit opened; task will use its fallback during cooldown"
                );
            }
        }

        warn!(
            task = %task.name,
            session = session_id,
            kind = %kind,
            authoritative = task.fallback.authoritative,
            "task fell back: {}",
            error
        );

        TaskResult::fallback(
            Arc::clone(&task.name),
            &task.fallback,
            kind,
            error.to_string(),
            duration,
        )
    }
}
