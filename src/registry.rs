//! TaskRegistry - runtime dispatch from task type strings
//!
//! A task's `type` is a runtime string selecting a user-registered body.
//! Registration happens on the engine's registry; lookup happens inside
//! each runner at dispatch time - the scheduler never dispatches on type.
//! Uses DashMap for lock-free concurrent access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::ast::BufferType;
use crate::buffer::SharedBuffer;
use crate::protocol::{ResolvedDep, ResolvedInputs, TaskAssignment};

/// Execution context handed to a task body.
///
/// Carries the resolved dependency inputs, the task config, a progress
/// sink and the cooperative cancellation flag.
pub struct TaskContext {
    pub task_id: Arc<str>,
    pub config: Option<serde_json::Map<String, Value>>,
    pub inputs: ResolvedInputs,
    pub output_type: BufferType,
    cancelled: Arc<AtomicBool>,
    progress: Option<Box<dyn Fn(Value) + Send>>,
}

impl TaskContext {
    /// Build a context for a dispatched assignment (worker side)
    pub(crate) fn new(
        assignment: TaskAssignment,
        cancelled: Arc<AtomicBool>,
        progress: Box<dyn Fn(Value) + Send>,
    ) -> Self {
        Self {
            task_id: assignment.task_id,
            config: assignment.config,
            inputs: assignment.inputs,
            output_type: assignment.output_type,
            cancelled,
            progress: Some(progress),
        }
    }

    /// Build a detached context: no progress sink, never cancelled.
    /// For tests and direct body invocation.
    pub fn detached(
        task_id: &str,
        config: Option<serde_json::Map<String, Value>>,
        inputs: ResolvedInputs,
        output_type: BufferType,
    ) -> Self {
        Self {
            task_id: Arc::from(task_id),
            config,
            inputs,
            output_type,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// First buffer under a dep key (the only one for scalar refs)
    pub fn input(&self, key: &str) -> Option<&SharedBuffer> {
        self.inputs.get(key).and_then(|d| d.buffers().first())
    }

    /// All buffers under a dep key, in position order
    pub fn group(&self, key: &str) -> Option<&[SharedBuffer]> {
        self.inputs.get(key).map(ResolvedDep::buffers)
    }

    /// A task-level config value
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.as_ref().and_then(|c| c.get(key))
    }

    /// Cooperative cancellation: long-running bodies should poll this
    /// and return an error promptly when set.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Emit a progress payload. May be dropped under backpressure;
    /// never blocks the body.
    pub fn progress(&self, payload: Value) {
        if let Some(sink) = &self.progress {
            sink(payload);
        }
    }
}

/// A user-registered task body.
///
/// Bodies run inside a pooled worker thread and return the raw bytes of
/// the task's output buffer (validated against `output_type` by the
/// worker) or an error message.
pub trait TaskImpl: Send + Sync {
    fn run(&self, ctx: &TaskContext) -> Result<Vec<u8>, String>;
}

/// Closure adapter so plain functions register without boilerplate
struct FnTask<F>(F);

impl<F> TaskImpl for FnTask<F>
where
    F: Fn(&TaskContext) -> Result<Vec<u8>, String> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> Result<Vec<u8>, String> {
        (self.0)(ctx)
    }
}

/// Registry mapping task type strings to implementations (lock-free)
#[derive(Clone, Default)]
pub struct TaskRegistry {
    impls: Arc<DashMap<String, Arc<dyn TaskImpl>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in task types
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("emit", Arc::new(EmitTask));
        registry.register("concat", Arc::new(ConcatTask));
        registry
    }

    /// Register an implementation for a type string.
    /// Re-registering a type replaces the previous implementation.
    pub fn register(&self, task_type: &str, body: Arc<dyn TaskImpl>) {
        self.impls.insert(task_type.to_string(), body);
    }

    /// Register a closure as a task body
    pub fn register_fn<F>(&self, task_type: &str, f: F)
    where
        F: Fn(&TaskContext) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.register(task_type, Arc::new(FnTask(f)));
    }

    /// Look up an implementation by type string
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskImpl>> {
        self.impls.get(task_type).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.impls.contains_key(task_type)
    }

    pub fn len(&self) -> usize {
        self.impls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impls.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
// BUILT-IN TASK TYPES
// ═══════════════════════════════════════════════════════════════

/// `emit` - produce bytes from config: `{ "bytes": [..] }` or `{ "text": ".." }`
struct EmitTask;

impl TaskImpl for EmitTask {
    fn run(&self, ctx: &TaskContext) -> Result<Vec<u8>, String> {
        if let Some(bytes) = ctx.config_value("bytes") {
            let arr = bytes
                .as_array()
                .ok_or_else(|| "config 'bytes' must be an array of numbers".to_string())?;
            return arr
                .iter()
                .map(|v| {
                    v.as_u64()
                        .filter(|&n| n <= u8::MAX as u64)
                        .map(|n| n as u8)
                        .ok_or_else(|| format!("invalid byte value: {v}"))
                })
                .collect();
        }
        if let Some(text) = ctx.config_value("text").and_then(Value::as_str) {
            return Ok(text.as_bytes().to_vec());
        }
        Err("emit requires config 'bytes' or 'text'".to_string())
    }
}

/// `concat` - concatenate every input buffer, keys in declaration order,
/// group elements in position order
struct ConcatTask;

impl TaskImpl for ConcatTask {
    fn run(&self, ctx: &TaskContext) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        for dep in ctx.inputs.values() {
            for buffer in dep.buffers() {
                out.extend_from_slice(buffer);
            }
        }
        Ok(out)
    }
}
