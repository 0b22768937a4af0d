//! Registry Module - task name to body mapping
//!
//! Key types:
//! - `TaskRegistry`: Immutable-after-build lookup of registered tasks
//! - `TaskRegistration`: Body + timeout + required deps + fallback + params
//! - `TaskHandler`: Async body contract (`TaskRequest` → `TaskOutput`)
//!
//! Unknown names are rejected when definitions are loaded (see `dag`), so
//! running workflows never look up a missing task.

mod entry;
mod handler;

pub use entry::TaskRegistration;
pub use handler::{handler_fn, FnHandler, TaskHandler, TaskOutput, TaskRequest};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{DuckflowError, Result};

/// Registered task bodies by name
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: FxHashMap<Arc<str>, Arc<TaskRegistration>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a task
    pub fn register(&mut self, registration: TaskRegistration) -> &mut Self {
        debug!(task = %registration.name, "registered task");
        self.tasks
            .insert(Arc::clone(&registration.name), Arc::new(registration));
        self
    }

    /// Shorthand for a closure body with a timeout
    pub fn register_fn<F, Fut>(&mut self, name: &str, timeout: Duration, f: F) -> &mut Self
    where
        F: Fn(TaskRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
    {
        self.register(TaskRegistration::new(name, handler_fn(f)).with_timeout(timeout))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TaskRegistration>> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names, sorted
    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskRegistration>> {
        self.tasks.values()
    }

    /// Invoke a registered body under a timeout.
    ///
    /// Body errors become `TaskError`, an elapsed timeout `TaskTimeout`.
    /// The registration's provider tag fills in when the body reports none.
    pub async fn invoke(&self, request: TaskRequest, timeout: Duration) -> Result<TaskOutput> {
        let registration =
            self.get(&request.task)
                .cloned()
                .ok_or_else(|| DuckflowError::TaskError {
                    task: request.task.to_string(),
                    reason: "task is not registered".to_string(),
                })?;
        invoke_registration(&registration, request, timeout).await
    }
}

pub(crate) async fn invoke_registration(
    registration: &TaskRegistration,
    request: TaskRequest,
    timeout: Duration,
) -> Result<TaskOutput> {
    let task = Arc::clone(&request.task);
    let mut output = tokio::time::timeout(timeout, registration.handler.call(request))
        .await
        .map_err(|_| DuckflowError::TaskTimeout {
            task: task.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| DuckflowError::TaskError {
            task: task.to_string(),
            reason: format!("{:#}", e),
        })?;

    if output.provider.is_none() {
        output.provider = registration.provider.as_deref().map(str::to_string);
    }
    Ok(output)
}
