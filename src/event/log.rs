//! EventLog - event sourcing for workflow execution
//!
//! Provides a full audit trail per run.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: run / task / runner levels
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

/// Single event in the workflow execution log
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since run start (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types (3 levels)
///
/// Uses Arc<str> for task_id fields to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        task_count: usize,
        /// Unique id for this execution
        run_id: String,
        /// Hash of the descriptor for audit correlation
        workflow_hash: String,
    },
    RunCompleted {
        total_duration_ms: u64,
    },
    RunFailed {
        error: String,
        failed_task: Option<Arc<str>>,
    },
    RunAborted {
        reason: String,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    TaskScheduled {
        task_id: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    /// Dispatch to a runner began, with resolved input sizes
    TaskStarted {
        task_id: Arc<str>,
        runner_id: u64,
        input_bytes: usize,
    },
    /// Progress message relayed from the runner (not on the caller stream)
    TaskProgress {
        task_id: Arc<str>,
        payload: Value,
    },
    TaskCompleted {
        task_id: Arc<str>,
        output_bytes: usize,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Arc<str>,
        error: String,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // RUNNER LEVEL (emitted on the pool's audit log,
    // since runners outlive individual runs)
    // ═══════════════════════════════════════════
    RunnerSpawned {
        runner_id: u64,
    },
    RunnerRetired {
        runner_id: u64,
    },
}

impl EventKind {
    /// Extract task_id if event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskScheduled { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskProgress { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id),
            Self::RunStarted { .. }
            | Self::RunCompleted { .. }
            | Self::RunFailed { .. }
            | Self::RunAborted { .. }
            | Self::RunnerSpawned { .. }
            | Self::RunnerRetired { .. } => None,
        }
    }

    /// Check if this is a run-level event
    pub fn is_run_event(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. }
                | Self::RunCompleted { .. }
                | Self::RunFailed { .. }
                | Self::RunAborted { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at run start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events for a specific task
    pub fn filter_task(&self, task_id: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Serialise the full log as a JSON array
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&*self.events.read()).unwrap_or(Value::Null)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
