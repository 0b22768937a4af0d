//! Execution plans - validated definitions resolved against the registry
//!
//! A plan freezes everything the scheduler needs per task (registration,
//! effective timeout, TTL, fallback) so a run never consults the registry
//! or config again. `DefinitionSet` is swapped atomically on reload.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ast::{FallbackSpec, TaskSpec, WorkflowDefinition};
use crate::error::{DuckflowError, Result};
use crate::registry::{TaskRegistration, TaskRegistry};

use super::flow::FlowGraph;
use super::validate::validate_definition;

/// Defaults applied when neither the definition nor the registration sets a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanDefaults {
    pub timeout: Duration,
    pub ttl: Duration,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            ttl: Duration::from_secs(300),
        }
    }
}

/// One task slot with its effective settings
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub name: Arc<str>,
    pub spec: Arc<TaskSpec>,
    pub registration: Arc<TaskRegistration>,
    pub timeout: Duration,
    pub ttl: Duration,
    pub fallback: FallbackSpec,
}

impl PlannedTask {
    pub fn cacheable(&self) -> bool {
        self.spec.cacheable
    }

    pub fn depends_on(&self) -> &[String] {
        &self.spec.depends_on
    }

    /// Direct dependencies plus upstream tasks the registration requires
    pub fn inputs(&self) -> Vec<String> {
        let mut inputs = self.spec.depends_on.clone();
        for required in &self.registration.requires {
            if !inputs.contains(required) {
                inputs.push(required.clone());
            }
        }
        inputs
    }
}

/// Executable form of one workflow
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub name: Arc<str>,
    pub definition: Arc<WorkflowDefinition>,
    pub graph: FlowGraph,
    /// Tasks grouped by level, declaration order within a level
    pub levels: Vec<Vec<Arc<PlannedTask>>>,
    /// Tasks merged into the final output
    pub outputs: Vec<Arc<str>>,
}

impl ExecutionPlan {
    /// Validate and resolve one definition
    pub fn build(
        definition: WorkflowDefinition,
        registry: &TaskRegistry,
        defaults: PlanDefaults,
    ) -> Result<Self> {
        validate_definition(&definition, registry)?;

        let graph = FlowGraph::from_definition(&definition);
        let levels = graph
            .levels()?
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .map(|name| resolve_task(&definition, registry, defaults, name))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = if definition.outputs.is_empty() {
            graph.get_final_tasks()
        } else {
            definition
                .outputs
                .iter()
                .map(|o| Arc::from(o.as_str()))
                .collect()
        };

        Ok(Self {
            name: Arc::from(definition.name.as_str()),
            definition: Arc::new(definition),
            graph,
            levels,
            outputs,
        })
    }

    pub fn task_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<PlannedTask>> {
        self.levels.iter().flatten()
    }

    pub fn task(&self, name: &str) -> Option<&Arc<PlannedTask>> {
        self.tasks().find(|t| t.name.as_ref() == name)
    }

    pub fn is_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o.as_ref() == name)
    }

    pub fn has_cacheable_tasks(&self) -> bool {
        self.tasks().any(|t| t.cacheable())
    }
}

fn resolve_task(
    definition: &WorkflowDefinition,
    registry: &TaskRegistry,
    defaults: PlanDefaults,
    name: Arc<str>,
) -> Result<Arc<PlannedTask>> {
    let unknown = || DuckflowError::UnknownTask {
        workflow: definition.name.clone(),
        task: name.to_string(),
    };
    let spec = definition.get_task(&name).cloned().ok_or_else(unknown)?;
    let registration = registry.get(&name).cloned().ok_or_else(unknown)?;

    let timeout = spec
        .timeout()
        .or(registration.timeout)
        .unwrap_or(defaults.timeout);
    let ttl = spec.ttl_or(defaults.ttl);
    let fallback = spec
        .fallback
        .clone()
        .or_else(|| registration.fallback.clone())
        .unwrap_or_else(FallbackSpec::missing);

    Ok(Arc::new(PlannedTask {
        name,
        spec,
        registration,
        timeout,
        ttl,
        fallback,
    }))
}

/// All loaded workflows, validated as a unit
#[derive(Debug, Clone, Default)]
pub struct DefinitionSet {
    plans: BTreeMap<String, Arc<ExecutionPlan>>,
}

impl DefinitionSet {
    /// Validate every definition; any error rejects the whole set
    pub fn build(
        definitions: Vec<WorkflowDefinition>,
        registry: &TaskRegistry,
        defaults: PlanDefaults,
    ) -> Result<Self> {
        let mut plans = BTreeMap::new();
        for definition in definitions {
            if plans.contains_key(&definition.name) {
                return Err(DuckflowError::ParseError {
                    details: format!("workflow '{}' is defined twice", definition.name),
                });
            }
            let plan = ExecutionPlan::build(definition, registry, defaults)?;
            plans.insert(plan.name.to_string(), Arc::new(plan));
        }
        Ok(Self { plans })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ExecutionPlan>> {
        self.plans.get(name)
    }

    /// Workflow names, sorted
    pub fn names(&self) -> Vec<String> {
        self.plans.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ExecutionPlan>> {
        self.plans.values()
    }
}
