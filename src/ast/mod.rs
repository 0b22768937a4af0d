//! AST Module - workflow definitions parsed from YAML
//!
//! - `workflow`: DefinitionFile, WorkflowDefinition, TaskSpec, FallbackSpec
//!
//! These types represent the "what" - static structure loaded at startup or
//! on reload. For execution, see the `runtime` module.

mod workflow;

pub use workflow::{DefinitionFile, FallbackSpec, TaskSpec, WorkflowDefinition};
