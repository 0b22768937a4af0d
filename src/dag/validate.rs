//! Definition validation
//!
//! Runs once per definition at load/reload time. A definition that passes
//! can be scheduled without any runtime lookups failing.

use rustc_hash::FxHashSet;

use crate::ast::WorkflowDefinition;
use crate::error::{DuckflowError, Result};
use crate::registry::TaskRegistry;

use super::flow::FlowGraph;

/// Validate one workflow definition against the registry.
///
/// Checks, in order:
/// 1. at least one task
/// 2. unique task names
/// 3. every task registered
/// 4. every dependency names a task of this workflow
/// 5. no cycles
/// 6. dependencies declared before their dependents
/// 7. registration-required inputs wired upstream
/// 8. output tasks exist
/// 9. cache TTLs are non-zero
pub fn validate_definition(definition: &WorkflowDefinition, registry: &TaskRegistry) -> Result<()> {
    let workflow = definition.name.as_str();

    if definition.tasks.is_empty() {
        return Err(DuckflowError::EmptyWorkflow {
            workflow: workflow.to_string(),
        });
    }

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for task in &definition.tasks {
        if !seen.insert(task.name.as_str()) {
            return Err(DuckflowError::DuplicateTask {
                workflow: workflow.to_string(),
                task: task.name.clone(),
            });
        }
    }

    for task in &definition.tasks {
        if !registry.contains(&task.name) {
            return Err(DuckflowError::UnknownTask {
                workflow: workflow.to_string(),
                task: task.name.clone(),
            });
        }
    }

    for task in &definition.tasks {
        if let Some(dep) = task.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(DuckflowError::UndeclaredDependency {
                workflow: workflow.to_string(),
                task: task.name.clone(),
                dependency: dep.clone(),
            });
        }
    }

    let graph = FlowGraph::from_definition(definition);
    graph.detect_cycles()?;

    let mut declared: FxHashSet<&str> = FxHashSet::default();
    for task in &definition.tasks {
        if let Some(dep) = task
            .depends_on
            .iter()
            .find(|d| !declared.contains(d.as_str()))
        {
            return Err(DuckflowError::UndeclaredDependency {
                workflow: workflow.to_string(),
                task: task.name.clone(),
                dependency: dep.clone(),
            });
        }
        declared.insert(task.name.as_str());
    }

    for task in &definition.tasks {
        let Some(registration) = registry.get(&task.name) else {
            continue;
        };
        for required in &registration.requires {
            let wired = required != &task.name
                && graph.contains(required)
                && graph.has_path(required, &task.name);
            if !wired {
                return Err(DuckflowError::MissingDependency {
                    workflow: workflow.to_string(),
                    task: task.name.clone(),
                    dependency: required.clone(),
                });
            }
        }
    }

    if let Some(output) = definition.outputs.iter().find(|o| !graph.contains(o)) {
        return Err(DuckflowError::UnknownOutputTask {
            workflow: workflow.to_string(),
            task: output.clone(),
        });
    }

    if let Some(task) = definition.tasks.iter().find(|t| t.cache_ttl_secs == Some(0)) {
        return Err(DuckflowError::ParseError {
            details: format!(
                "task '{}' in workflow '{}' has cache_ttl_secs: 0",
                task.name, workflow
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TaskSpec;
    use crate::registry::{TaskOutput, TaskRegistration};
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for name in ["emotion", "recall", "tips"] {
            registry.register_fn(name, Duration::from_secs(1), |_req| async {
                Ok(TaskOutput::new(json!(null)))
            });
        }
        registry.register(
            TaskRegistration::new(
                "style",
                crate::registry::handler_fn(|_req| async { Ok(TaskOutput::new(json!("ok"))) }),
            )
            .requires(["emotion"]),
        );
        registry
    }

    fn enhanced() -> WorkflowDefinition {
        WorkflowDefinition::new("enhanced_chat_flow")
            .task(TaskSpec::new("emotion").cacheable())
            .task(TaskSpec::new("recall").depends_on(["emotion"]))
            .task(TaskSpec::new("tips").depends_on(["emotion"]))
            .task(TaskSpec::new("style").depends_on(["recall", "tips"]))
            .outputs(["style"])
    }

    #[test]
    fn valid_definition_passes() {
        assert!(validate_definition(&enhanced(), &registry()).is_ok());
    }

    #[test]
    fn empty_workflow_rejected() {
        let err = validate_definition(&WorkflowDefinition::new("empty"), &registry()).unwrap_err();
        assert!(matches!(err, DuckflowError::EmptyWorkflow { .. }));
    }

    #[test]
    fn unknown_task_rejected() {
        let def = WorkflowDefinition::new("w").task(TaskSpec::new("ghost"));
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(err, DuckflowError::UnknownTask { ref task, .. } if task == "ghost"));
    }

    #[test]
    fn duplicate_task_rejected() {
        let def = WorkflowDefinition::new("w")
            .task(TaskSpec::new("emotion"))
            .task(TaskSpec::new("emotion"));
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(err, DuckflowError::DuplicateTask { .. }));
    }

    #[test]
    fn dependency_on_foreign_task_rejected() {
        let def = WorkflowDefinition::new("w").task(TaskSpec::new("tips").depends_on(["nowhere"]));
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(
            err,
            DuckflowError::UndeclaredDependency { ref dependency, .. } if dependency == "nowhere"
        ));
    }

    #[test]
    fn cycle_rejected_before_ordering() {
        let def = WorkflowDefinition::new("w")
            .task(TaskSpec::new("recall").depends_on(["tips"]))
            .task(TaskSpec::new("tips").depends_on(["recall"]));
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(err, DuckflowError::CyclicDependency { .. }));
    }

    #[test]
    fn forward_reference_rejected() {
        let def = WorkflowDefinition::new("w")
            .task(TaskSpec::new("recall").depends_on(["emotion"]))
            .task(TaskSpec::new("emotion"));
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(
            err,
            DuckflowError::UndeclaredDependency { ref task, .. } if task == "recall"
        ));
    }

    #[test]
    fn transitively_wired_requirement_accepted() {
        // style requires emotion; reachable through recall
        let def = WorkflowDefinition::new("w")
            .task(TaskSpec::new("emotion"))
            .task(TaskSpec::new("recall").depends_on(["emotion"]))
            .task(TaskSpec::new("style").depends_on(["recall"]));
        assert!(validate_definition(&def, &registry()).is_ok());
    }

    #[test]
    fn missing_requirement_rejected() {
        let def = WorkflowDefinition::new("w")
            .task(TaskSpec::new("tips"))
            .task(TaskSpec::new("style").depends_on(["tips"]));
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(
            err,
            DuckflowError::MissingDependency { ref dependency, .. } if dependency == "emotion"
        ));
    }

    #[test]
    fn unknown_output_rejected() {
        let def = enhanced().outputs(["reply"]);
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(err, DuckflowError::UnknownOutputTask { .. }));
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut spec = TaskSpec::new("emotion").cacheable();
        spec.cache_ttl_secs = Some(0);
        let def = WorkflowDefinition::new("w").task(spec);
        let err = validate_definition(&def, &registry()).unwrap_err();
        assert!(matches!(err, DuckflowError::ParseError { ref details } if details.contains("emotion")));
    }
}
