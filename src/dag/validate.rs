//! Graph validation - duplicate ids, missing deps, cycle detection
//!
//! Validation runs before any task executes:
//! 1. First pass builds the task map in input order, rejecting duplicate
//!    and empty ids.
//! 2. Second pass is a recursive DFS with three-color marking
//!    (white/gray/black) over dependency edges; an edge to an unknown
//!    task raises immediately, an edge to a gray node raises a cycle
//!    with the gray-stack path.
//!
//! Dep keys are visited in insertion order and group elements in
//! position order, so error messages are reproducible.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ast::{TaskSpec, Workflow};
use crate::dag::DependencyCounter;
use crate::error::{Result, RunaError};
use crate::util::intern;

/// Stack-allocated id lists: most tasks have 0-4 dependents
pub type DepVec = SmallVec<[Arc<str>; 4]>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validated, materialised task graph.
///
/// Holds the interned task map, the reverse-dependency index (direct
/// successors, deduplicated) and each task's initial unresolved-dep
/// count (with multiplicity for groups and repeated references).
#[derive(Debug)]
pub struct TaskGraph {
    tasks: FxHashMap<Arc<str>, Arc<TaskSpec>>,
    /// Task ids in descriptor input order
    order: Vec<Arc<str>>,
    /// task_id -> tasks that list it as a dependency target
    dependents: FxHashMap<Arc<str>, DepVec>,
    /// task_id -> unresolved dependency references at start
    initial_counts: FxHashMap<Arc<str>, u32>,
}

impl TaskGraph {
    /// Task ids in input order
    pub fn ids(&self) -> &[Arc<str>] {
        &self.order
    }

    pub fn task(&self, id: &str) -> Option<&Arc<TaskSpec>> {
        self.tasks.get(id)
    }

    /// Direct successors of a task (deduplicated)
    pub fn dependents(&self, id: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.dependents.get(id).map_or(EMPTY, SmallVec::as_slice)
    }

    pub fn initial_count(&self, id: &str) -> u32 {
        self.initial_counts.get(id).copied().unwrap_or(0)
    }

    /// Build a fresh dependency counter seeded with the initial counts
    pub fn counter(&self) -> DependencyCounter {
        let mut counter = DependencyCounter::init(self.order.iter().cloned());
        for (id, &count) in &self.initial_counts {
            counter.set(Arc::clone(id), count);
        }
        counter
    }

    /// Number of direct references `dependent` makes to `target`, counted
    /// with multiplicity. Used when decrementing after `target` finishes.
    pub fn reference_count(&self, dependent: &str, target: &str) -> u32 {
        self.tasks
            .get(dependent)
            .map(|spec| spec.references_to(target))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Validate a workflow descriptor and materialise its task graph.
///
/// Errors, in detection order: `DuplicateTask`, `DependencyNotFound`,
/// `CycleDetected`, `NoInitialTasks`.
pub fn validate(workflow: &Workflow) -> Result<TaskGraph> {
    let capacity = workflow.tasks.len();
    let mut tasks: FxHashMap<Arc<str>, Arc<TaskSpec>> =
        FxHashMap::with_capacity_and_hasher(capacity, Default::default());
    let mut order: Vec<Arc<str>> = Vec::with_capacity(capacity);

    // Pass 1: task map in input order, duplicate and id-shape checks
    for spec in &workflow.tasks {
        if spec.id.is_empty() {
            return Err(RunaError::InvalidTaskId {
                id: spec.id.clone(),
                reason: "task id cannot be empty".to_string(),
            });
        }
        let id = intern(&spec.id);
        if tasks.insert(Arc::clone(&id), Arc::clone(spec)).is_some() {
            return Err(RunaError::DuplicateTask {
                task_id: spec.id.clone(),
            });
        }
        order.push(id);
    }

    // Pass 2: DFS with three-color marking over dependency edges
    let mut colors: FxHashMap<Arc<str>, Color> = order
        .iter()
        .map(|id| (Arc::clone(id), Color::White))
        .collect();
    let mut stack: Vec<Arc<str>> = Vec::new();

    fn dfs(
        node: &Arc<str>,
        tasks: &FxHashMap<Arc<str>, Arc<TaskSpec>>,
        colors: &mut FxHashMap<Arc<str>, Color>,
        stack: &mut Vec<Arc<str>>,
    ) -> Result<()> {
        colors.insert(Arc::clone(node), Color::Gray);
        stack.push(Arc::clone(node));

        let spec = &tasks[node];
        if let Some(deps) = &spec.dependencies {
            for dep in deps.values() {
                for target in dep.targets() {
                    let Some((target_id, _)) = tasks.get_key_value(target.as_str()) else {
                        return Err(RunaError::DependencyNotFound {
                            task_id: node.to_string(),
                            dep_id: target.clone(),
                        });
                    };
                    match colors[target_id] {
                        Color::Gray => {
                            // The gray target is on the current stack; the
                            // cycle path runs from it through the current
                            // node and closes on the target.
                            let cycle_start = stack
                                .iter()
                                .position(|x| x.as_ref() == target.as_str())
                                .unwrap_or(0);
                            let mut path: Vec<String> =
                                stack[cycle_start..].iter().map(|s| s.to_string()).collect();
                            path.push(target.clone());
                            return Err(RunaError::CycleDetected {
                                task_id: target.clone(),
                                path,
                            });
                        }
                        Color::White => {
                            let target_id = Arc::clone(target_id);
                            dfs(&target_id, tasks, colors, stack)?;
                        }
                        Color::Black => {} // Already fully explored
                    }
                }
            }
        }

        stack.pop();
        colors.insert(Arc::clone(node), Color::Black);
        Ok(())
    }

    for id in &order {
        if colors[id] == Color::White {
            dfs(id, &tasks, &mut colors, &mut stack)?;
        }
    }

    materialize(tasks, order)
}

/// Materialise the reverse index and initial counts.
///
/// `NoInitialTasks` is defense in depth here: a validated non-empty
/// graph always has at least one root (a cycle is caught first).
fn materialize(
    tasks: FxHashMap<Arc<str>, Arc<TaskSpec>>,
    order: Vec<Arc<str>>,
) -> Result<TaskGraph> {
    let mut dependents: FxHashMap<Arc<str>, DepVec> = order
        .iter()
        .map(|id| (Arc::clone(id), DepVec::new()))
        .collect();
    let mut initial_counts: FxHashMap<Arc<str>, u32> =
        FxHashMap::with_capacity_and_hasher(order.len(), Default::default());

    for id in &order {
        let spec = &tasks[id];
        initial_counts.insert(Arc::clone(id), spec.dependency_arity());

        if let Some(deps) = &spec.dependencies {
            for dep in deps.values() {
                for target in dep.targets() {
                    let entry = dependents
                        .get_mut(target.as_str())
                        .expect("dependency target validated");
                    // Dedup: a task appears once per source even when it
                    // references the source from multiple keys or slots.
                    if !entry.iter().any(|t| t == id) {
                        entry.push(Arc::clone(id));
                    }
                }
            }
        }
    }

    if !order.is_empty() && initial_counts.values().all(|&c| c > 0) {
        return Err(RunaError::NoInitialTasks);
    }

    Ok(TaskGraph {
        tasks,
        order,
        dependents,
        initial_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(value: serde_json::Value) -> Workflow {
        serde_json::from_value(value).unwrap()
    }

    // ═══════════════════════════════════════════════════════════════
    // VALIDATION ERROR TESTS
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn duplicate_id_is_rejected() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "a", "type": "emit" }
            ]
        }));

        let err = validate(&wf).unwrap_err();
        assert!(matches!(err, RunaError::DuplicateTask { ref task_id } if task_id == "a"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let wf = workflow(json!({
            "tasks": [ { "id": "", "type": "emit" } ]
        }));

        assert!(matches!(
            validate(&wf).unwrap_err(),
            RunaError::InvalidTaskId { .. }
        ));
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit", "dependencies": { "in": "zz" } }
            ]
        }));

        let err = validate(&wf).unwrap_err();
        match err {
            RunaError::DependencyNotFound { task_id, dep_id } => {
                assert_eq!(task_id, "a");
                assert_eq!(dep_id, "zz");
            }
            other => panic!("expected DependencyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_dep_in_group_is_rejected() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "b", "type": "concat", "dependencies": { "in": ["a", "ghost"] } }
            ]
        }));

        assert!(matches!(
            validate(&wf).unwrap_err(),
            RunaError::DependencyNotFound { ref dep_id, .. } if dep_id == "ghost"
        ));
    }

    // ═══════════════════════════════════════════════════════════════
    // CYCLE DETECTION TESTS
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn two_node_cycle_reports_path() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit", "dependencies": { "in": "b" } },
                { "id": "b", "type": "emit", "dependencies": { "in": "a" } }
            ]
        }));

        match validate(&wf).unwrap_err() {
            RunaError::CycleDetected { task_id, path } => {
                assert_eq!(task_id, "a");
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit", "dependencies": { "me": "a" } }
            ]
        }));

        match validate(&wf).unwrap_err() {
            RunaError::CycleDetected { path, .. } => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn cycle_path_starts_at_closing_node() {
        // entry -> a -> b -> c -> a: path excludes the entry node
        let wf = workflow(json!({
            "tasks": [
                { "id": "entry", "type": "emit", "dependencies": { "in": "a" } },
                { "id": "a", "type": "emit", "dependencies": { "in": "b" } },
                { "id": "b", "type": "emit", "dependencies": { "in": "c" } },
                { "id": "c", "type": "emit", "dependencies": { "in": "a" } }
            ]
        }));

        match validate(&wf).unwrap_err() {
            RunaError::CycleDetected { task_id, path } => {
                assert_eq!(task_id, "a");
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn diamond_is_acyclic() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "b", "type": "emit", "dependencies": { "in": "a" } },
                { "id": "c", "type": "emit", "dependencies": { "in": "a" } },
                { "id": "d", "type": "concat", "dependencies": { "l": "b", "r": "c" } }
            ]
        }));

        let graph = validate(&wf).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.initial_count("a"), 0);
        assert_eq!(graph.initial_count("d"), 2);
    }

    #[test]
    fn empty_workflow_is_valid() {
        let wf = workflow(json!({ "tasks": [] }));
        let graph = validate(&wf).unwrap();
        assert!(graph.is_empty());
    }

    // ═══════════════════════════════════════════════════════════════
    // MATERIALISATION TESTS
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn group_counts_with_multiplicity() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "t", "type": "concat", "dependencies": { "k": ["a", "a", "a"] } }
            ]
        }));

        let graph = validate(&wf).unwrap();
        assert_eq!(graph.initial_count("t"), 3);
        // The reverse index stays deduplicated.
        assert_eq!(graph.dependents("a").len(), 1);
        assert_eq!(graph.reference_count("t", "a"), 3);
    }

    #[test]
    fn dependents_keyed_by_target_not_key() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "src", "type": "emit" },
                { "id": "t", "type": "concat", "dependencies": { "some_key": "src" } }
            ]
        }));

        let graph = validate(&wf).unwrap();
        assert_eq!(graph.dependents("src"), [intern("t")]);
        assert!(graph.dependents("some_key").is_empty());
    }

    #[test]
    fn counter_seeds_initial_counts() {
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit" },
                { "id": "b", "type": "emit", "dependencies": { "in": "a" } }
            ]
        }));

        let graph = validate(&wf).unwrap();
        let counter = graph.counter();
        assert!(counter.is_zero("a"));
        assert_eq!(counter.get("b"), Some(1));
    }

    #[test]
    fn no_initial_tasks_detected_on_materialize() {
        // Bypass cycle detection to exercise the defense-in-depth check.
        let wf = workflow(json!({
            "tasks": [
                { "id": "a", "type": "emit", "dependencies": { "in": "b" } },
                { "id": "b", "type": "emit", "dependencies": { "in": "a" } }
            ]
        }));

        let mut tasks = FxHashMap::default();
        let mut order = Vec::new();
        for spec in &wf.tasks {
            let id = intern(&spec.id);
            tasks.insert(Arc::clone(&id), Arc::clone(spec));
            order.push(id);
        }

        assert!(matches!(
            materialize(tasks, order).unwrap_err(),
            RunaError::NoInitialTasks
        ));
    }
}
