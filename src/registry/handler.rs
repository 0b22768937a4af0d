//! Task body contract
//!
//! A task body is a single async function shape: it receives the original
//! chat input plus the outputs of its dependencies and returns a JSON value.
//! Agent "types" are expressed as tagged registrations, not as trait
//! hierarchies.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::runtime::ChatInput;

/// Everything a task body gets to see
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task: Arc<str>,
    pub session_id: Arc<str>,
    pub input: Arc<ChatInput>,
    /// Outputs of the workflow-declared dependencies (real or fallback)
    pub deps: FxHashMap<Arc<str>, Arc<Value>>,
    /// Opaque registration params (personality config etc.)
    pub params: Arc<Value>,
}

impl TaskRequest {
    /// Output of one dependency
    pub fn dep(&self, name: &str) -> Option<&Value> {
        self.deps.get(name).map(|v| v.as_ref())
    }

    pub fn text(&self) -> &str {
        &self.input.text
    }
}

/// Value produced by a task body
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub value: Value,
    /// Backing implementation that produced it (e.g. "claude", "openai")
    pub provider: Option<String>,
}

impl TaskOutput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

impl From<Value> for TaskOutput {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Task body abstraction
///
/// Implementations:
/// - [`FnHandler`]: wraps an async closure
/// - the demo bodies in [`crate::builtin`]
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn call(&self, request: TaskRequest) -> anyhow::Result<TaskOutput>;
}

/// Adapter turning an async closure into a [`TaskHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskOutput>> + Send,
{
    async fn call(&self, request: TaskRequest) -> anyhow::Result<TaskOutput> {
        (self.f)(request).await
    }
}

/// Box an async closure as a shared handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}
