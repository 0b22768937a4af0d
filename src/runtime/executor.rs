//! Task Executor - one task invocation inside a run
//!
//! Order per task: cache lookup, breaker check, body under its timeout,
//! fallback on failure, cache write on success. Every result is recorded
//! in the performance monitor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::dag::PlannedTask;
use crate::error::DuckflowError;
use crate::monitor::PerformanceMonitor;
use crate::registry::{invoke_registration, TaskRequest};
use crate::resilience::FallbackPolicy;
use crate::store::TaskResult;

use super::context::ExecutionContext;

/// Shared per-process services a task invocation goes through
#[derive(Clone)]
pub struct TaskExecutor {
    cache: Arc<CacheStore>,
    policy: Arc<FallbackPolicy>,
    monitor: Arc<PerformanceMonitor>,
    /// Recent messages folded into cache keys
    context_messages: usize,
}

impl TaskExecutor {
    pub fn new(
        cache: Arc<CacheStore>,
        policy: Arc<FallbackPolicy>,
        monitor: Arc<PerformanceMonitor>,
        context_messages: usize,
    ) -> Self {
        Self {
            cache,
            policy,
            monitor,
            context_messages,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn policy(&self) -> &Arc<FallbackPolicy> {
        &self.policy
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Produce the task's result: cached, real, or fallback. Never fails.
    #[instrument(skip_all, fields(task = %task.name, session = %ctx.session_id))]
    pub async fn execute(&self, task: &PlannedTask, ctx: &ExecutionContext) -> TaskResult {
        let start = Instant::now();
        let key = task
            .cacheable()
            .then(|| CacheKey::derive(&task.name, &ctx.input, self.context_messages));

        if let Some(key) = key {
            if let Some(result) = self.lookup(task, key, start) {
                self.monitor.record_task(&result);
                return result;
            }
        }

        let result = match self.invoke(task, ctx).await {
            Ok(result) => {
                self.policy.record_success(&ctx.session_id, &task.name);
                if let Some(key) = key {
                    self.store(task, key, ctx, &result);
                }
                result
            }
            Err(err) => self
                .policy
                .recover(task, &ctx.session_id, &err, start.elapsed()),
        };

        self.monitor.record_task(&result);
        result
    }

    /// Fallback result for a task whose body panicked
    pub fn recover_panic(
        &self,
        task: &PlannedTask,
        ctx: &ExecutionContext,
        reason: String,
        duration: Duration,
    ) -> TaskResult {
        let err = DuckflowError::TaskError {
            task: task.name.to_string(),
            reason,
        };
        let result = self.policy.recover(task, &ctx.session_id, &err, duration);
        self.monitor.record_task(&result);
        result
    }

    fn lookup(&self, task: &PlannedTask, key: CacheKey, start: Instant) -> Option<TaskResult> {
        match self.cache.get(&key) {
            Ok(Some(entry)) => {
                debug!(%key, age_ms = entry.age().as_millis() as u64, "cache hit");
                Some(TaskResult::from_cache(
                    Arc::clone(&task.name),
                    entry.value,
                    start.elapsed(),
                    entry.provider,
                ))
            }
            Ok(None) => {
                debug!(%key, "cache miss");
                None
            }
            Err(e) => {
                warn!("{}; treating as miss", e);
                None
            }
        }
    }

    async fn invoke(
        &self,
        task: &PlannedTask,
        ctx: &ExecutionContext,
    ) -> crate::error::Result<TaskResult> {
        let start = Instant::now();
        self.policy.check(&ctx.session_id, &task.name)?;

        let request = TaskRequest {
            task: Arc::clone(&task.name),
            session_id: Arc::clone(&ctx.session_id),
            input: Arc::clone(&ctx.input),
            deps: ctx.dependency_outputs(&task.inputs()),
            params: Arc::clone(&task.registration.params),
        };
        let output = invoke_registration(&task.registration, request, task.timeout).await?;

        Ok(TaskResult::success(
            Arc::clone(&task.name),
            Arc::new(output.value),
            start.elapsed(),
            output.provider.map(Arc::from),
        ))
    }

    /// Cache a fresh result unless it was computed from fallback inputs
    fn store(&self, task: &PlannedTask, key: CacheKey, ctx: &ExecutionContext, result: &TaskResult) {
        if !ctx.dependencies_succeeded(&task.inputs()) {
            debug!(%key, "not caching: computed from fallback inputs");
            return;
        }
        if let Err(e) = self.cache.put_tagged(
            key,
            Arc::clone(&result.output),
            result.provider.clone(),
            task.ttl,
            Some(&ctx.session_id),
        ) {
            warn!("{}; result not cached", e);
        }
    }
}
