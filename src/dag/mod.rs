//! DAG Module - workflow graphs and execution plans
//!
//! - `flow`: FlowGraph built from `depends_on` edges (levels, cycles)
//! - `validate`: load-time definition checks
//! - `plan`: ExecutionPlan / DefinitionSet resolved against the registry
//!
//! Plans are immutable; reload swaps the whole `DefinitionSet`.

mod flow;
mod plan;
mod validate;

pub use flow::{DepVec, FlowGraph};
pub use plan::{DefinitionSet, ExecutionPlan, PlanDefaults, PlannedTask};
pub use validate::validate_definition;
