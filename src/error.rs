//! Runa Error Types with Error Codes
//!
//! Error code ranges:
//! - RUNA-000-009: Descriptor/parse errors
//! - RUNA-010-019: Graph validation errors
//! - RUNA-020-029: Buffer errors
//! - RUNA-030-039: Runner pool errors
//! - RUNA-040-049: Runtime/scheduling errors
//! - RUNA-090-099: IO/serialisation errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunaError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum RunaError {
    // ═══════════════════════════════════════════
    // DESCRIPTOR ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[RUNA-001] Failed to parse workflow descriptor: {details}")]
    #[diagnostic(
        code(runa::parse_error),
        help("Check descriptor syntax: tasks need an id and a type")
    )]
    ParseError { details: String },

    #[error("[RUNA-002] Workflow file not found: {path}")]
    #[diagnostic(code(runa::workflow_not_found), help("Check the file path exists"))]
    WorkflowNotFound { path: String },

    // ═══════════════════════════════════════════
    // GRAPH VALIDATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[RUNA-010] Duplicate task id '{task_id}'")]
    #[diagnostic(code(runa::duplicate_task), help("Rename one of the duplicate tasks"))]
    DuplicateTask { task_id: String },

    #[error("[RUNA-011] Task '{task_id}' depends on unknown task '{dep_id}'")]
    #[diagnostic(code(runa::dependency_not_found))]
    DependencyNotFound { task_id: String, dep_id: String },

    #[error("[RUNA-012] Cycle detected in task graph: {}", .path.join(" → "))]
    #[diagnostic(
        code(runa::cycle_detected),
        help("Remove circular dependencies from your workflow")
    )]
    CycleDetected { task_id: String, path: Vec<String> },

    #[error("[RUNA-013] No initial tasks: every task has unresolved dependencies")]
    #[diagnostic(code(runa::no_initial_tasks))]
    NoInitialTasks,

    #[error("[RUNA-014] Invalid task id '{id}': {reason}")]
    #[diagnostic(code(runa::invalid_task_id))]
    InvalidTaskId { id: String, reason: String },

    // ═══════════════════════════════════════════
    // BUFFER ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[RUNA-020] Unknown buffer type tag '{tag}'")]
    #[diagnostic(
        code(runa::unknown_buffer_tag),
        help("Use one of: float32, float64, int8, int16, int32, uint8, uint8_clamped, uint16, uint32, bigint64, biguint64")
    )]
    UnknownBufferTag { tag: String },

    #[error(
        "[RUNA-021] Task '{task_id}' produced {len} bytes, not a multiple of {element_size} ({tag})"
    )]
    #[diagnostic(code(runa::buffer_length_mismatch))]
    BufferLengthMismatch {
        task_id: String,
        len: usize,
        element_size: usize,
        tag: &'static str,
    },

    // ═══════════════════════════════════════════
    // RUNNER POOL ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[RUNA-030] Runner pool terminated")]
    #[diagnostic(code(runa::pool_terminated))]
    PoolTerminated,

    #[error("[RUNA-031] Failed to spawn runner: {reason}")]
    #[diagnostic(code(runa::runner_spawn_failed))]
    RunnerSpawnFailed { reason: String },

    #[error("[RUNA-032] Invalid pool bounds: min={min}, max={max}")]
    #[diagnostic(
        code(runa::invalid_pool_bounds),
        help("Bounds must satisfy 0 < min <= max")
    )]
    InvalidPoolBounds { min: usize, max: usize },

    #[error("[RUNA-033] Runner {runner_id} stopped responding")]
    #[diagnostic(code(runa::runner_unresponsive))]
    RunnerUnresponsive { runner_id: u64 },

    // ═══════════════════════════════════════════
    // RUNTIME ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[RUNA-040] Task '{task_id}' failed: {reason}")]
    #[diagnostic(code(runa::task_execution))]
    TaskExecution { task_id: String, reason: String },

    #[error("[RUNA-041] Workflow aborted: {reason}")]
    #[diagnostic(code(runa::aborted))]
    Aborted { reason: String },

    #[error("[RUNA-042] No task implementation registered for type '{task_type}'")]
    #[diagnostic(
        code(runa::unknown_task_type),
        help("Register the type on the TaskRegistry before running")
    )]
    UnknownTaskType { task_type: String },

    #[error("[RUNA-043] Worker is busy (request {request_id})")]
    #[diagnostic(code(runa::worker_busy))]
    WorkerBusy { request_id: u64 },

    // ═══════════════════════════════════════════
    // IO / SERIALISATION ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[RUNA-090] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[RUNA-091] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[RUNA-092] YAML parse error: {0}")]
    #[diagnostic(
        code(runa::yaml_parse),
        help("Check syntax: indentation must be consistent, strings with special chars need quoting")
    )]
    YamlParse(#[from] serde_yaml::Error),
}

impl RunaError {
    /// Get the error code (e.g., "RUNA-010")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "RUNA-001",
            Self::WorkflowNotFound { .. } => "RUNA-002",
            Self::DuplicateTask { .. } => "RUNA-010",
            Self::DependencyNotFound { .. } => "RUNA-011",
            Self::CycleDetected { .. } => "RUNA-012",
            Self::NoInitialTasks => "RUNA-013",
            Self::InvalidTaskId { .. } => "RUNA-014",
            Self::UnknownBufferTag { .. } => "RUNA-020",
            Self::BufferLengthMismatch { .. } => "RUNA-021",
            Self::PoolTerminated => "RUNA-030",
            Self::RunnerSpawnFailed { .. } => "RUNA-031",
            Self::InvalidPoolBounds { .. } => "RUNA-032",
            Self::RunnerUnresponsive { .. } => "RUNA-033",
            Self::TaskExecution { .. } => "RUNA-040",
            Self::Aborted { .. } => "RUNA-041",
            Self::UnknownTaskType { .. } => "RUNA-042",
            Self::WorkerBusy { .. } => "RUNA-043",
            Self::IoError(_) => "RUNA-090",
            Self::JsonError(_) => "RUNA-091",
            Self::YamlParse(_) => "RUNA-092",
        }
    }

    /// Check if this error terminates a run before any task starts
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTask { .. }
                | Self::DependencyNotFound { .. }
                | Self::CycleDetected { .. }
                | Self::NoInitialTasks
                | Self::InvalidTaskId { .. }
        )
    }
}

impl FixSuggestion for RunaError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            RunaError::ParseError { .. } => {
                Some("Check descriptor syntax: tasks need an id and a type")
            }
            RunaError::WorkflowNotFound { .. } => Some("Check the file path exists"),
            RunaError::DuplicateTask { .. } => Some("Rename one of the duplicate tasks"),
            RunaError::DependencyNotFound { .. } => {
                Some("Add the missing task or fix the dependency reference")
            }
            RunaError::CycleDetected { .. } => {
                Some("Remove circular dependencies from your workflow")
            }
            RunaError::NoInitialTasks => Some("At least one task must have no dependencies"),
            RunaError::InvalidTaskId { .. } => Some("Task ids must be non-empty strings"),
            RunaError::UnknownBufferTag { .. } => {
                Some("Use one of the supported buffer type tags (e.g. uint8, float32)")
            }
            RunaError::BufferLengthMismatch { .. } => {
                Some("Produce a byte count that is a multiple of the element width")
            }
            RunaError::PoolTerminated => {
                Some("The pool was shut down; create a new engine to run workflows")
            }
            RunaError::RunnerSpawnFailed { .. } => {
                Some("Check thread limits and runner startup logs")
            }
            RunaError::InvalidPoolBounds { .. } => Some("Bounds must satisfy 0 < min <= max"),
            RunaError::RunnerUnresponsive { .. } => {
                Some("The runner missed the abort grace period and was replaced")
            }
            RunaError::TaskExecution { .. } => {
                Some("Check the task implementation and its inputs")
            }
            RunaError::Aborted { .. } => None,
            RunaError::UnknownTaskType { .. } => {
                Some("Register the type on the TaskRegistry before running")
            }
            RunaError::WorkerBusy { .. } => {
                Some("A runner accepts one request at a time; acquire it through the pool")
            }
            RunaError::IoError(_) => Some("Check file path and permissions"),
            RunaError::JsonError(_) => Some("Check JSON syntax"),
            RunaError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}
