// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Duckflow Error Types with Error Codes
//!
//! Error code ranges:
//! - DUCK-000-009: Definition/config loading errors
//! - DUCK-010-019: Definition validation errors (fail fast at load time)
//! - DUCK-020-029: Task execution errors (recovered through fallbacks)
//! - DUCK-030-039: Cache errors (degrade to cache miss)
//! - DUCK-040-049: Run-level errors
//! - DUCK-090-099: IO/serialization errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DuckflowError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum DuckflowError {
    // ═══════════════════════════════════════════
    // LOADING ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[DUCK-001] Failed to parse workflow definitions: {details}")]
    #[diagnostic(
        code(duckflow::parse_error),
        help("Check YAML syntax: indentation and quoting")
    )]
    ParseError { details: String },

    #[error("[DUCK-002] Workflow '{name}' not found")]
    #[diagnostic(code(duckflow::workflow_not_found))]
    WorkflowNotFound { name: String },

    #[error("[DUCK-003] Workflow definitions file not found: {path}")]
    #[diagnostic(code(duckflow::definitions_not_found))]
    DefinitionsNotFound { path: String },

    #[error("[DUCK-004] Configuration error: {reason}")]
    #[diagnostic(code(duckflow::config_error))]
    ConfigError { reason: String },

    // ═══════════════════════════════════════════
    // VALIDATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[DUCK-010] Workflow '{workflow}' references unregistered task '{task}'")]
    #[diagnostic(code(duckflow::unknown_task))]
    UnknownTask { workflow: String, task: String },

    #[error("[DUCK-011] Cycle detected in workflow '{workflow}': {cycle}")]
    #[diagnostic(code(duckflow::cyclic_dependency))]
    CyclicDependency { workflow: String, cycle: String },

    #[error(
        "[DUCK-012] Task '{task}' in workflow '{workflow}' depends on '{dependency}', which is not declared earlier"
    )]
    #[diagnostic(code(duckflow::undeclared_dependency))]
    UndeclaredDependency {
        workflow: String,
        task: String,
        dependency: String,
    },

    #[error("[DUCK-013] Task '{task}' is declared twice in workflow '{workflow}'")]
    #[diagnostic(code(duckflow::duplicate_task))]
    DuplicateTask { workflow: String, task: String },

    #[error("[DUCK-014] Output task '{task}' is not part of workflow '{workflow}'")]
    #[diagnostic(code(duckflow::unknown_output_task))]
    UnknownOutputTask { workflow: String, task: String },

    #[error(
        "[DUCK-015] Task '{task}' requires '{dependency}' but workflow '{workflow}' does not run it upstream"
    )]
    #[diagnostic(code(duckflow::missing_dependency))]
    MissingDependency {
        workflow: String,
        task: String,
        dependency: String,
    },

    #[error("[DUCK-016] Workflow '{workflow}' has no tasks")]
    #[diagnostic(code(duckflow::empty_workflow))]
    EmptyWorkflow { workflow: String },

    // ═══════════════════════════════════════════
    // TASK EXECUTION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[DUCK-020] Task '{task}' timed out after {timeout_ms}ms")]
    #[diagnostic(code(duckflow::task_timeout))]
    TaskTimeout { task: String, timeout_ms: u64 },

    #[error("[DUCK-021] Task '{task}' failed: {reason}")]
    #[diagnostic(code(duckflow::task_error))]
    TaskError { task: String, reason: String },

    #[error("[DUCK-022] Circuit open for task '{task}' in session '{session}'")]
    #[diagnostic(code(duckflow::circuit_open))]
    CircuitOpen { task: String, session: String },

    // ═══════════════════════════════════════════
    // CACHE ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[DUCK-030] Cache unavailable: {reason}")]
    #[diagnostic(code(duckflow::cache_unavailable))]
    CacheUnavailable { reason: String },

    // ═══════════════════════════════════════════
    // RUN ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[DUCK-040] Run of workflow '{workflow}' was cancelled")]
    #[diagnostic(code(duckflow::run_cancelled))]
    RunCancelled { workflow: String },

    #[error("[DUCK-041] Workflow '{workflow}' failed: output task '{task}' fell back to a non-authoritative default")]
    #[diagnostic(code(duckflow::run_failed))]
    RunFailed { workflow: String, task: String },

    #[error("[DUCK-042] Run of workflow '{workflow}' aborted: {reason}")]
    #[diagnostic(code(duckflow::run_aborted))]
    RunAborted { workflow: String, reason: String },

    // ═══════════════════════════════════════════
    // IO/SERIALIZATION ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[DUCK-090] IO error: {0}")]
    #[diagnostic(code(duckflow::io_error))]
    IoError(#[from] std::io::Error),

    #[error("[DUCK-091] JSON error: {0}")]
    #[diagnostic(code(duckflow::json_error))]
    JsonError(#[from] serde_json::Error),

    #[error("[DUCK-092] YAML error: {0}")]
    #[diagnostic(code(duckflow::yaml_error))]
    YamlError(#[from] serde_yaml::Error),
}

impl DuckflowError {
    /// Get the error code (e.g., "DUCK-010")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "DUCK-001",
            Self::WorkflowNotFound { .. } => "DUCK-002",
            Self::DefinitionsNotFound { .. } => "DUCK-003",
            Self::ConfigError { .. } => "DUCK-004",
            Self::UnknownTask { .. } => "DUCK-010",
            Self::CyclicDependency { .. } => "DUCK-011",
            Self::UndeclaredDependency { .. } => "DUCK-012",
            Self::DuplicateTask { .. } => "DUCK-013",
            Self::UnknownOutputTask { .. } => "DUCK-014",
            Self::MissingDependency { .. } => "DUCK-015",
            Self::EmptyWorkflow { .. } => "DUCK-016",
            Self::TaskTimeout { .. } => "DUCK-020",
            Self::TaskError { .. } => "DUCK-021",
            Self::CircuitOpen { .. } => "DUCK-022",
            Self::CacheUnavailable { .. } => "DUCK-030",
            Self::RunCancelled { .. } => "DUCK-040",
            Self::RunFailed { .. } => "DUCK-041",
            Self::RunAborted { .. } => "DUCK-042",
            Self::IoError(_) => "DUCK-090",
            Self::JsonError(_) => "DUCK-091",
            Self::YamlError(_) => "DUCK-092",
        }
    }

    /// Errors raised while loading or validating definitions.
    ///
    /// These fail fast and never reach a running workflow.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::ParseError { .. }
                | Self::DefinitionsNotFound { .. }
                | Self::ConfigError { .. }
                | Self::UnknownTask { .. }
                | Self::CyclicDependency { .. }
                | Self::UndeclaredDependency { .. }
                | Self::DuplicateTask { .. }
                | Self::UnknownOutputTask { .. }
                | Self::MissingDependency { .. }
                | Self::EmptyWorkflow { .. }
                | Self::YamlError(_)
        )
    }
}

impl FixSuggestion for DuckflowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::ParseError { .. } | Self::YamlError(_) => {
                Some("Check YAML syntax: indentation and quoting")
            }
            Self::WorkflowNotFound { .. } => Some("Run `duckflow workflows` to list loaded workflows"),
            Self::DefinitionsNotFound { .. } => Some("Check the definitions path exists"),
            Self::ConfigError { .. } => {
                Some("Check ~/.config/duckflow/config.toml or the DUCKFLOW_CONFIG path")
            }
            Self::UnknownTask { .. } => Some("Register the task before loading the workflow"),
            Self::CyclicDependency { .. } => Some("Remove the circular depends_on chain"),
            Self::UndeclaredDependency { .. } => {
                Some("Declare dependencies before the tasks that use them")
            }
            Self::DuplicateTask { .. } => Some("Each task may appear once per workflow"),
            Self::UnknownOutputTask { .. } => Some("List only tasks of this workflow under outputs"),
            Self::MissingDependency { .. } => {
                Some("Add the required task to depends_on (directly or transitively)")
            }
            Self::EmptyWorkflow { .. } => Some("Add at least one task"),
            Self::TaskTimeout { .. } => Some("Increase timeout_ms or check the backing provider"),
            Self::TaskError { .. } => None,
            Self::CircuitOpen { .. } => Some("Wait for the breaker cooldown to elapse"),
            Self::CacheUnavailable { .. } => None,
            Self::RunCancelled { .. } => None,
            Self::RunFailed { .. } => Some("Configure an authoritative fallback for the output task"),
            Self::RunAborted { .. } => None,
            Self::IoError(_) | Self::JsonError(_) => None,
        }
    }
}
