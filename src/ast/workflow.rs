//! Workflow Types - descriptor structure
//!
//! Contains the core wire-parsed types:
//! - `Workflow`: root descriptor with tasks and optional config
//! - `TaskSpec`: individual task definition
//! - `DepRef`: single or group dependency reference
//!
//! Descriptors arrive as JSON or YAML; dependency key order is preserved
//! (IndexMap) so validation errors are reproducible.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::buffer_type::BufferType;
use crate::error::RunaError;

/// Workflow descriptor parsed from JSON/YAML (raw)
#[derive(Debug, Deserialize)]
struct WorkflowRaw {
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub config: Option<serde_json::Map<String, Value>>,
}

/// Workflow with Arc-wrapped tasks for efficient cloning
#[derive(Debug)]
pub struct Workflow {
    pub tasks: Vec<Arc<TaskSpec>>,
    /// Workflow-level configuration, passed through to task bodies
    pub config: Option<serde_json::Map<String, Value>>,
}

impl<'de> Deserialize<'de> for Workflow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = WorkflowRaw::deserialize(deserializer)?;
        Ok(Workflow {
            tasks: raw.tasks.into_iter().map(Arc::new).collect(),
            config: raw.config,
        })
    }
}

impl Workflow {
    /// Parse a descriptor from source text.
    ///
    /// YAML is a superset of JSON here, so a single parser covers both
    /// wire shapes.
    pub fn parse(source: &str) -> Result<Self, RunaError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Number of tasks in the descriptor
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the descriptor has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Compute a hash of the workflow for audit correlation.
    ///
    /// Uses xxhash3 for fast hashing over task ids, types and dependency
    /// shapes. Returns a 16-character hex string (64-bit hash).
    pub fn compute_hash(&self) -> String {
        use xxhash_rust::xxh3::xxh3_64;

        let mut hasher_input = String::new();
        hasher_input.push_str(&self.tasks.len().to_string());
        for task in &self.tasks {
            hasher_input.push_str(&task.id);
            hasher_input.push_str(&task.task_type);
            hasher_input.push_str(task.output_type.tag());
            if let Some(deps) = &task.dependencies {
                for (key, dep) in deps {
                    hasher_input.push_str(key);
                    for target in dep.targets() {
                        hasher_input.push_str(target);
                    }
                }
            }
        }

        let hash = xxh3_64(hasher_input.as_bytes());
        format!("{:016x}", hash)
    }
}

/// A single task definition
#[derive(Debug, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    /// Runtime dispatch key: selects the registered task implementation
    #[serde(rename = "type")]
    pub task_type: String,
    /// Named dependency references; insertion order is preserved
    #[serde(default)]
    pub dependencies: Option<IndexMap<String, DepRef>>,
    /// Task-level configuration, passed through to the task body
    #[serde(default)]
    pub config: Option<serde_json::Map<String, Value>>,
    /// Element type of the produced buffer (defaults to uint8)
    #[serde(default, rename = "outputType")]
    pub output_type: BufferType,
}

impl TaskSpec {
    /// Total number of dependency references, counted with multiplicity
    /// (a group of n targets contributes n).
    pub fn dependency_arity(&self) -> u32 {
        self.dependencies
            .as_ref()
            .map(|deps| deps.values().map(|d| d.targets().len() as u32).sum())
            .unwrap_or(0)
    }

    /// Number of direct references this task makes to `target`, counted
    /// with multiplicity across keys and group slots.
    pub fn references_to(&self, target: &str) -> u32 {
        self.dependencies
            .as_ref()
            .map(|deps| {
                deps.values()
                    .flat_map(|d| d.targets())
                    .filter(|t| t.as_str() == target)
                    .count() as u32
            })
            .unwrap_or(0)
    }
}

/// Handles string OR array for a dependency value
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DepRef {
    Single(String),
    Group(Vec<String>),
}

impl DepRef {
    /// Dependency targets in position order
    pub fn targets(&self) -> &[String] {
        match self {
            DepRef::Single(s) => std::slice::from_ref(s),
            DepRef::Group(v) => v.as_slice(),
        }
    }

    /// Whether this reference is a group (ordered list of targets)
    pub fn is_group(&self) -> bool {
        matches!(self, DepRef::Group(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Workflow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parse_minimal_workflow() {
        let wf = parse(json!({
            "tasks": [
                { "id": "a", "type": "emit" }
            ]
        }));

        assert_eq!(wf.len(), 1);
        assert_eq!(wf.tasks[0].id, "a");
        assert_eq!(wf.tasks[0].task_type, "emit");
        assert!(wf.tasks[0].dependencies.is_none());
        assert_eq!(wf.tasks[0].output_type, BufferType::Uint8);
    }

    #[test]
    fn parse_single_and_group_deps() {
        let wf = parse(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "b", "type": "emit" },
                { "id": "c", "type": "concat",
                  "dependencies": { "left": "a", "rest": ["a", "b"] } }
            ]
        }));

        let deps = wf.tasks[2].dependencies.as_ref().unwrap();
        assert!(!deps["left"].is_group());
        assert_eq!(deps["left"].targets(), ["a".to_string()]);
        assert!(deps["rest"].is_group());
        assert_eq!(deps["rest"].targets().len(), 2);
    }

    #[test]
    fn dependency_key_order_is_preserved() {
        let wf = parse(json!({
            "tasks": [
                { "id": "z", "type": "emit" },
                { "id": "y", "type": "emit" },
                { "id": "t", "type": "concat",
                  "dependencies": { "second": "z", "first": "y" } }
            ]
        }));

        let keys: Vec<&String> = wf.tasks[2].dependencies.as_ref().unwrap().keys().collect();
        assert_eq!(keys, ["second", "first"]);
    }

    #[test]
    fn arity_counts_with_multiplicity() {
        let wf = parse(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "t", "type": "concat",
                  "dependencies": { "k": ["a", "a", "a"], "s": "a" } }
            ]
        }));

        let t = &wf.tasks[1];
        assert_eq!(t.dependency_arity(), 4);
        assert_eq!(t.references_to("a"), 4);
        assert_eq!(t.references_to("b"), 0);
    }

    #[test]
    fn output_type_parses_from_tag() {
        let wf = parse(json!({
            "tasks": [
                { "id": "a", "type": "emit", "outputType": "float32" }
            ]
        }));
        assert_eq!(wf.tasks[0].output_type, BufferType::Float32);
    }

    #[test]
    fn parse_yaml_descriptor() {
        let yaml = r#"
tasks:
  - id: fetch
    type: emit
  - id: merge
    type: concat
    dependencies:
      input: fetch
config:
  label: demo
"#;
        let wf = Workflow::parse(yaml).unwrap();
        assert_eq!(wf.len(), 2);
        assert!(wf.config.is_some());
    }

    #[test]
    fn parse_json_descriptor() {
        let json = r#"{ "tasks": [ { "id": "a", "type": "emit" } ], "config": null }"#;
        let wf = Workflow::parse(json).unwrap();
        assert_eq!(wf.len(), 1);
    }

    #[test]
    fn hash_is_stable_and_shape_sensitive() {
        let a = parse(json!({ "tasks": [ { "id": "a", "type": "emit" } ] }));
        let b = parse(json!({ "tasks": [ { "id": "a", "type": "emit" } ] }));
        let c = parse(json!({ "tasks": [ { "id": "b", "type": "emit" } ] }));

        assert_eq!(a.compute_hash(), b.compute_hash());
        assert_ne!(a.compute_hash(), c.compute_hash());
        assert_eq!(a.compute_hash().len(), 16);
    }
}
