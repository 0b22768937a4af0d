//! Workflow Types - immutable workflow definitions
//!
//! Contains the YAML-parsed types:
//! - `DefinitionFile`: Root document (`workflows:` map)
//! - `WorkflowDefinition`: Named, ordered task list plus output tasks
//! - `TaskSpec`: Per-workflow task wiring (deps, cache, timeout, fallback)
//! - `FallbackSpec`: Statically configured substitute output

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DuckflowError, Result};

fn default_true() -> bool {
    true
}

/// Substitute output used when a task times out, errors, or its breaker is open.
///
/// Non-authoritative fallbacks on an output task mark the whole run as failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSpec {
    #[serde(default)]
    pub output: Value,
    #[serde(default = "default_true")]
    pub authoritative: bool,
}

impl FallbackSpec {
    pub fn authoritative(output: Value) -> Self {
        Self {
            output,
            authoritative: true,
        }
    }

    pub fn non_authoritative(output: Value) -> Self {
        Self {
            output,
            authoritative: false,
        }
    }

    /// Used when neither the workflow nor the registration configured one
    pub fn missing() -> Self {
        Self::non_authoritative(Value::Null)
    }
}

/// One task slot inside a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub cacheable: bool,
    /// Overrides `cache.default_ttl_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    /// Overrides the registration timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Overrides the registration fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackSpec>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            cacheable: false,
            cache_ttl_secs: None,
            timeout_ms: None,
            fallback: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Mark cacheable with a TTL, rounded up to whole seconds (at least one)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        self.cacheable = true;
        self.cache_ttl_secs = Some(secs.max(1));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackSpec) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Effective TTL given the configured default
    pub fn ttl_or(&self, default: Duration) -> Duration {
        self.cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// Workflow as written in YAML (name comes from the map key)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkflowRaw {
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

/// Named workflow with Arc-wrapped tasks for cheap cloning into runs
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    /// Declared output tasks; empty means "tasks without dependents"
    pub outputs: Vec<String>,
    pub tasks: Vec<Arc<TaskSpec>>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(Arc::new(spec));
        self
    }

    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn get_task(&self, name: &str) -> Option<&Arc<TaskSpec>> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Compute a hash of the definition for reload logging
    ///
    /// Uses xxhash3 over the name, outputs and task wiring.
    /// Returns a 16-character hex string (64-bit hash).
    pub fn compute_hash(&self) -> String {
        use xxhash_rust::xxh3::xxh3_64;

        let mut hasher_input = String::new();
        hasher_input.push_str(&self.name);
        for output in &self.outputs {
            hasher_input.push_str(output);
        }
        hasher_input.push_str(&self.tasks.len().to_string());
        for task in &self.tasks {
            hasher_input.push_str(&task.name);
            hasher_input.push_str(&task.depends_on.join(","));
            hasher_input.push(if task.cacheable { 'c' } else { '-' });
        }

        format!("{:016x}", xxh3_64(hasher_input.as_bytes()))
    }
}

/// Root YAML document
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DefinitionFile {
    #[serde(default)]
    workflows: BTreeMap<String, WorkflowRaw>,
}

impl DefinitionFile {
    /// Parse YAML into definitions (sorted by workflow name).
    ///
    /// Structural parsing only; wiring is checked by `dag::DefinitionSet::build`.
    pub fn parse(yaml: &str) -> Result<Vec<WorkflowDefinition>> {
        let file: DefinitionFile =
            serde_yaml::from_str(yaml).map_err(|e| DuckflowError::ParseError {
                details: e.to_string(),
            })?;
        Ok(file.into_definitions())
    }

    pub fn load(path: &Path) -> Result<Vec<WorkflowDefinition>> {
        if !path.exists() {
            return Err(DuckflowError::DefinitionsNotFound {
                path: path.display().to_string(),
            });
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::parse(&yaml)
    }

    pub fn into_definitions(self) -> Vec<WorkflowDefinition> {
        self.workflows
            .into_iter()
            .map(|(name, raw)| WorkflowDefinition {
                name,
                outputs: raw.outputs,
                tasks: raw.tasks.into_iter().map(Arc::new).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const YAML: &str = r#"
workflows:
  enhanced_chat_flow:
    outputs: [style]
    tasks:
      - name: emotion
        cacheable: true
        cache_ttl_secs: 120
        fallback:
          output: { label: neutral, intensity: 0.0 }
      - name: recall
        depends_on: [emotion]
        timeout_ms: 250
      - name: tips
        depends_on: [emotion]
      - name: style
        depends_on: [recall, tips]
        fallback:
          output: "I'm here for you."
          authoritative: false
  basic_chat_flow:
    tasks:
      - name: emotion
        cacheable: true
      - name: style
        depends_on: [emotion]
"#;

    #[test]
    fn test_parse_definition_file() {
        let defs = DefinitionFile::parse(YAML).unwrap();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["basic_chat_flow", "enhanced_chat_flow"]);

        let enhanced = &defs[1];
        assert_eq!(enhanced.outputs, vec!["style".to_string()]);
        assert_eq!(enhanced.tasks.len(), 4);

        let emotion = enhanced.get_task("emotion").unwrap();
        assert!(emotion.cacheable);
        assert_eq!(emotion.ttl_or(Duration::from_secs(300)), Duration::from_secs(120));
        assert_eq!(
            emotion.fallback,
            Some(FallbackSpec::authoritative(
                json!({"label": "neutral", "intensity": 0.0})
            ))
        );

        let recall = enhanced.get_task("recall").unwrap();
        assert_eq!(recall.depends_on, vec!["emotion".to_string()]);
        assert_eq!(recall.timeout(), Some(Duration::from_millis(250)));

        let style = enhanced.get_task("style").unwrap();
        assert!(!style.fallback.as_ref().unwrap().authoritative);
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let defs = DefinitionFile::parse(YAML).unwrap();
        let style = defs[0].get_task("style").unwrap();
        assert!(!style.cacheable);
        assert!(style.timeout().is_none());
        assert!(style.fallback.is_none());
        assert_eq!(style.ttl_or(Duration::from_secs(300)), Duration::from_secs(300));
    }

    #[test]
    fn test_subsecond_ttl_rounds_up() {
        let spec = TaskSpec::new("emotion").with_ttl(Duration::from_millis(800));
        assert!(spec.cacheable);
        assert_eq!(spec.ttl_or(Duration::from_secs(300)), Duration::from_secs(1));

        let spec = TaskSpec::new("emotion").with_ttl(Duration::from_millis(2500));
        assert_eq!(spec.cache_ttl_secs, Some(3));
        assert_eq!(TaskSpec::new("emotion").with_ttl(Duration::ZERO).cache_ttl_secs, Some(1));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = DefinitionFile::parse("workflows: [not, a, map").unwrap_err();
        assert!(matches!(err, DuckflowError::ParseError { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DefinitionFile::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, DuckflowError::DefinitionsNotFound { .. }));
    }

    #[test]
    fn test_builder_matches_yaml() {
        let built = WorkflowDefinition::new("basic_chat_flow")
            .task(TaskSpec::new("emotion").cacheable())
            .task(TaskSpec::new("style").depends_on(["emotion"]));
        let parsed = DefinitionFile::parse(YAML).unwrap().remove(0);
        assert_eq!(built, parsed);
        assert_eq!(built.compute_hash(), parsed.compute_hash());
    }

    #[test]
    fn test_hash_changes_with_wiring() {
        let a = WorkflowDefinition::new("w")
            .task(TaskSpec::new("a"))
            .task(TaskSpec::new("b").depends_on(["a"]));
        let b = WorkflowDefinition::new("w")
            .task(TaskSpec::new("a"))
            .task(TaskSpec::new("b"));
        assert_ne!(a.compute_hash(), b.compute_hash());
        assert_eq!(a.compute_hash().len(), 16);
    }
}
