//! Task registration record

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::ast::FallbackSpec;

use super::handler::TaskHandler;

/// A named task body with its declared contract
///
/// The scheduler only looks at the name, timeout, dependencies and fallback.
/// `params` is opaque and passed through to the body untouched.
#[derive(Clone)]
pub struct TaskRegistration {
    pub name: Arc<str>,
    pub handler: Arc<dyn TaskHandler>,
    /// `None` uses `engine.default_timeout_ms`
    pub timeout: Option<Duration>,
    /// Upstream tasks whose output this body needs
    pub requires: Vec<String>,
    pub fallback: Option<FallbackSpec>,
    /// Reported when the body doesn't name its own provider
    pub provider: Option<Arc<str>>,
    pub params: Arc<Value>,
}

impl TaskRegistration {
    pub fn new(name: impl Into<Arc<str>>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            timeout: None,
            requires: Vec::new(),
            fallback: None,
            provider: None,
            params: Arc::new(Value::Null),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackSpec) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<Arc<str>>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Arc::new(params);
        self
    }
}

impl fmt::Debug for TaskRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistration")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("requires", &self.requires)
            .field("fallback", &self.fallback)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
