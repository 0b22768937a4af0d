//! Duckflow - chat workflow orchestration engine
//!
//! For every inbound chat message, runs a small DAG of analysis and
//! response tasks with result caching, streaming progress, per-task
//! timeout/fallback handling and execution metrics.
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       YAML → Rust types (WorkflowDefinition, TaskSpec) │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  registry/  Task bodies by name (TaskRegistry, TaskHandler)  │
//! │  dag/       DAG structure (FlowGraph, ExecutionPlan)         │
//! │  runtime/   Execution (Engine, Scheduler, TaskExecutor)      │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  cache/      Content-addressed TTL cache (CacheStore)        │
//! │  store/      Per-run results (DataStore, TaskResult)         │
//! │  event/      Progress events (EventLog, RunStream)           │
//! │  resilience/ Fallbacks and circuit breakers                  │
//! │  monitor/    Rolling statistics (PerformanceMonitor)         │
//! │  session/    Conversation windows (SessionStore)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | YAML parsing → `WorkflowDefinition`, `TaskSpec`, `FallbackSpec` |
//! | [`registry`] | Name → task body, timeout, fallback, provider tag |
//! | [`dag`] | Levels, cycle detection, eager validation, execution plans |
//! | [`runtime`] | Engine lifecycle, scheduling, warmup, run outcomes |
//! | [`cache`] | Cache keys, TTL store, background sweeper |
//! | [`store`] | Write-once per-run task results (DashMap) |
//! | [`event`] | Ordered run events, synchronous log and stream |
//! | [`resilience`] | Fallback substitution, per-session breakers |
//! | [`monitor`] | Latency, hit rate, success rate, per-task stats |
//! | [`session`] | Injected conversation-window store |
//! | [`builtin`] | Demo task bodies and workflows for the CLI |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - YAML → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ast;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Execution logic
// ═══════════════════════════════════════════════════════════════
pub mod dag;
pub mod registry;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Cache, results, events, resilience
// ═══════════════════════════════════════════════════════════════
pub mod cache;
pub mod event;
pub mod monitor;
pub mod resilience;
pub mod session;
pub mod store;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// DEMO - Built-in task bodies
// ═══════════════════════════════════════════════════════════════
pub mod builtin;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{DuckflowError, FixSuggestion, Result};

// Config types
pub use config::EngineConfig;

// Definitions
pub use ast::{DefinitionFile, FallbackSpec, TaskSpec, WorkflowDefinition};

// Registry
pub use registry::{handler_fn, TaskHandler, TaskOutput, TaskRegistration, TaskRegistry, TaskRequest};

// Runtime
pub use runtime::{
    ChatInput, Engine, EngineBuilder, HealthReport, HealthStatus, RunOutcome, RunStatus,
};

// Events
pub use event::{Event, EventKind, RunStream};

// Results and metrics
pub use monitor::StatsSnapshot;
pub use session::{ChatMessage, InMemorySessionStore, Role, SessionStore};
pub use store::{FailureKind, TaskResult};
