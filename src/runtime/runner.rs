//! Scheduler - level-by-level workflow execution with tokio
//!
//! - Every task of a level is spawned on a JoinSet; the level is fully
//!   drained before the next one starts
//! - An optional semaphore caps concurrent tasks per run
//! - Cancellation skips tasks that have not started; started tasks run to
//!   completion so their results still reach the cache

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::dag::{ExecutionPlan, PlannedTask};
use crate::error::{DuckflowError, Result};
use crate::event::{EventEmitter, EventKind};
use crate::store::TaskResult;

use super::context::ExecutionContext;
use super::executor::TaskExecutor;
use super::outcome::{RunOutcome, RunStatus};

/// Runs execution plans; cheap to clone into spawned runs
#[derive(Clone)]
pub struct Scheduler {
    executor: TaskExecutor,
    /// `None` runs a whole level at once
    max_concurrency: Option<usize>,
}

impl Scheduler {
    pub fn new(executor: TaskExecutor, max_concurrency: Option<usize>) -> Self {
        Self {
            executor,
            max_concurrency: max_concurrency.filter(|n| *n > 0),
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    /// Execute every level of `plan`.
    ///
    /// Returns `RunCancelled` once the token fired; tasks already in flight
    /// are awaited first and keep their results.
    #[instrument(
        skip_all,
        fields(workflow = %plan.name, session = %ctx.session_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn run(
        &self,
        plan: Arc<ExecutionPlan>,
        ctx: Arc<ExecutionContext>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<RunOutcome> {
        let run_start = Instant::now();
        let task_count = plan.task_count();
        info!(tasks = task_count, "starting run");

        emitter.emit(EventKind::Start {
            workflow: Arc::clone(&plan.name),
            session_id: Arc::clone(&ctx.session_id),
            correlation_id: Arc::clone(&ctx.correlation_id),
            task_count,
        });

        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        for (level, tasks) in plan.levels.iter().enumerate() {
            if ctx.is_cancelled() {
                debug!(level, "cancelled; skipping remaining levels");
                break;
            }
            debug!(level, width = tasks.len(), "starting level");
            self.run_level(level, tasks, &ctx, &emitter, semaphore.as_ref())
                .await;
        }

        if ctx.is_cancelled() || ctx.results.len() < task_count {
            info!(
                completed = ctx.results.len(),
                tasks = task_count,
                "run cancelled"
            );
            emitter.emit(EventKind::run_cancelled(&plan.name));
            return Err(DuckflowError::RunCancelled {
                workflow: plan.name.to_string(),
            });
        }

        let outcome = self.finish(&plan, &ctx, run_start);
        self.executor.monitor().record_run(
            Arc::clone(&plan.name),
            outcome.total_duration,
            outcome.cache_hit,
            outcome.is_success(),
        );

        emitter.emit(EventKind::Complete {
            status: outcome.status,
            total_duration_ms: outcome.total_duration.as_millis() as u64,
            output: Arc::new(outcome.output.clone()),
        });
        info!(
            status = %outcome.status,
            duration_ms = outcome.total_duration.as_millis() as u64,
            cache_hit = outcome.cache_hit,
            "run finished"
        );
        Ok(outcome)
    }

    async fn run_level(
        &self,
        level: usize,
        tasks: &[Arc<PlannedTask>],
        ctx: &Arc<ExecutionContext>,
        emitter: &Arc<dyn EventEmitter>,
        semaphore: Option<&Arc<Semaphore>>,
    ) {
        let mut join_set = JoinSet::new();

        for task in tasks {
            let task = Arc::clone(task);
            let ctx = Arc::clone(ctx);
            let emitter = Arc::clone(emitter);
            let executor = self.executor.clone();
            let semaphore = semaphore.cloned();

            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                if ctx.is_cancelled() {
                    return None;
                }

                emitter.emit(EventKind::TaskStart {
                    task_name: Arc::clone(&task.name),
                    level,
                });
                let started = Instant::now();
                let result = match AssertUnwindSafe(executor.execute(&task, &ctx))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(task = %task.name, "task panicked: {}", reason);
                        executor.recover_panic(
                            &task,
                            &ctx,
                            format!("task panicked: {}", reason),
                            started.elapsed(),
                        )
                    }
                };
                publish(emitter.as_ref(), &result);
                ctx.results.insert(result);
                Some(())
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(level, "task join failed: {}", e);
            }
        }
    }

    /// Merge outputs and compute aggregate figures of a complete run
    fn finish(&self, plan: &ExecutionPlan, ctx: &ExecutionContext, run_start: Instant) -> RunOutcome {
        let results = ctx.results.snapshot();
        let status = RunStatus::from_results(results.values(), |name| plan.is_output(name));

        let output = match plan.outputs.as_slice() {
            [single] => ctx
                .results
                .get_output(single)
                .map(|v| (*v).clone())
                .unwrap_or(Value::Null),
            many => Value::Object(
                many.iter()
                    .map(|name| {
                        let value = ctx
                            .results
                            .get_output(name)
                            .map(|v| (*v).clone())
                            .unwrap_or(Value::Null);
                        (name.to_string(), value)
                    })
                    .collect::<Map<String, Value>>(),
            ),
        };

        let successes = results.values().filter(|r| r.is_success()).count();
        let success_rate = if results.is_empty() {
            1.0
        } else {
            successes as f64 / results.len() as f64
        };

        let mut cacheable = plan.tasks().filter(|t| t.cacheable()).peekable();
        let cache_hit = cacheable.peek().is_some()
            && cacheable.all(|t| {
                results
                    .get(t.name.as_ref())
                    .is_some_and(|r| r.served_from_cache)
            });

        RunOutcome {
            workflow: plan.name.to_string(),
            session_id: ctx.session_id.to_string(),
            correlation_id: ctx.correlation_id.to_string(),
            status,
            outputs: plan.outputs.iter().map(|o| o.to_string()).collect(),
            output,
            results,
            events: Vec::new(),
            total_duration: run_start.elapsed(),
            success_rate,
            cache_hit,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Emit `error` (for fallbacks) then `task_end`
fn publish(emitter: &dyn EventEmitter, result: &TaskResult) {
    if let (Some(kind), Some(message)) = (result.failure_kind(), result.error()) {
        emitter.emit(EventKind::Error {
            task_name: Some(Arc::clone(&result.task_name)),
            kind: kind.as_str().to_string(),
            message: message.to_string(),
        });
    }
    emitter.emit(EventKind::TaskEnd {
        task_name: Arc::clone(&result.task_name),
        success: result.is_success(),
        served_from_cache: result.served_from_cache,
        duration_ms: result.duration_ms(),
        output: Arc::clone(&result.output),
    });
}
