//! Run outcome - what `Engine::execute` hands back

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::DuckflowError;
use crate::event::Event;
use crate::store::TaskResult;

/// Overall status of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every task produced a real result
    Completed,
    /// Some tasks fell back, but the output is usable
    PartiallyCompleted,
    /// An output task fell back to a non-authoritative default
    Failed,
}

impl RunStatus {
    /// Derive the status from the results of a fully executed run
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a TaskResult>,
        is_output: impl Fn(&str) -> bool,
    ) -> Self {
        let mut degraded = false;
        for result in results {
            if result.is_success() {
                continue;
            }
            if result.is_non_authoritative() && is_output(&result.task_name) {
                return Self::Failed;
            }
            degraded = true;
        }
        if degraded {
            Self::PartiallyCompleted
        } else {
            Self::Completed
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

fn duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Merged output plus every per-task result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub workflow: String,
    pub session_id: String,
    pub correlation_id: String,
    pub status: RunStatus,
    /// Tasks whose results form `output`
    pub outputs: Vec<String>,
    /// Output task value, or an object keyed by task when there are several
    pub output: Value,
    pub results: BTreeMap<String, TaskResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
    #[serde(rename = "total_duration_ms", serialize_with = "duration_ms")]
    pub total_duration: Duration,
    /// Successful tasks / total tasks
    pub success_rate: f64,
    /// Every cacheable task was served from cache
    pub cache_hit: bool,
}

impl RunOutcome {
    pub fn result(&self, task: &str) -> Option<&TaskResult> {
        self.results.get(task)
    }

    pub fn is_success(&self) -> bool {
        !self.status.is_failed()
    }

    /// Results that fell back, in task-name order
    pub fn fallbacks(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.values().filter(|r| !r.is_success())
    }

    /// Backing providers reported by task results, sorted and de-duplicated
    pub fn providers_used(&self) -> Vec<String> {
        let mut providers: Vec<String> = self
            .results
            .values()
            .filter_map(|r| r.provider.as_deref().map(str::to_string))
            .collect();
        providers.sort();
        providers.dedup();
        providers
    }

    /// `RunFailed` naming the output task that fell back, if the run failed
    pub fn failure(&self) -> Option<DuckflowError> {
        if !self.status.is_failed() {
            return None;
        }
        let task = self
            .results
            .values()
            .filter(|r| self.outputs.iter().any(|o| *o == *r.task_name))
            .find(|r| r.is_non_authoritative())
            .map(|r| r.task_name.to_string())
            .unwrap_or_default();
        Some(DuckflowError::RunFailed {
            workflow: self.workflow.clone(),
            task,
        })
    }
}
