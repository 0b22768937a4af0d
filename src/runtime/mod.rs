//! Runtime Module - workflow execution
//!
//! Contains the runtime execution components:
//! - `context`: Per-request state (`ChatInput`, `ExecutionContext`)
//! - `executor`: One task invocation (cache, breaker, timeout, fallback)
//! - `runner`: Level-by-level DAG execution with tokio concurrency
//! - `warmup`: Background best-effort warmup of every task
//! - `engine`: Process-scoped entry point with run, metrics and admin APIs
//! - `outcome`: `RunOutcome` and `RunStatus`
//!
//! This module represents the "how" - runtime execution.
//! For static structure, see the `ast` and `dag` modules.

mod context;
mod engine;
mod executor;
mod outcome;
mod runner;
mod warmup;

pub use context::{ChatInput, ExecutionContext};
pub use engine::{Engine, EngineBuilder, HealthReport, HealthStatus, OptimizeReport};
pub use executor::TaskExecutor;
pub use outcome::{RunOutcome, RunStatus};
pub use runner::Scheduler;
pub use warmup::{WarmupRunner, WarmupStatus, WARMUP_TEXT};
