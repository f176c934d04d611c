//! Runa - DAG task workflow engine
//!
//! Executes a user-supplied DAG of tasks. Each task produces a typed
//! binary buffer that becomes an input to its dependents. The engine
//! enforces dependency order, runs ready tasks concurrently across a
//! bounded pool of isolated workers, streams intermediate results to
//! the caller, and supports cooperative cancellation.
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       descriptor types (Workflow, TaskSpec, DepRef)    │
//! │  buffer     write-once shared byte buffers                   │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  dag/       validation + dependency counting (TaskGraph)     │
//! │  runtime/   scheduler, readiness gates, result stream        │
//! │  pool/      bounded runner pool, worker threads              │
//! │  protocol   runner messages + wire envelopes                 │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  store      task output storage (DashMap)                    │
//! │  event/     event sourcing for audit trail                   │
//! │  registry   task type → implementation dispatch              │
//! │  util/      string interning                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | Descriptor parsing → `Workflow`, `TaskSpec`, `BufferType` |
//! | [`dag`] | Duplicate/missing/cycle validation, reverse index, counts |
//! | [`runtime`] | Per-task fibres, readiness gates, streamed events |
//! | [`pool`] | Bounded worker pool with queued acquires |
//! | [`protocol`] | Request/response messages, result envelopes |
//! | [`store`] | Thread-safe task output storage |
//! | [`event`] | Event sourcing for audit trail |
//! | [`registry`] | Runtime dispatch from task type strings |
//! | [`engine`] | Caller-owned façade wiring it all together |
//! | [`error`] | Error types with codes and fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL
// ═══════════════════════════════════════════════════════════════
pub mod ast;
pub mod buffer;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER
// ═══════════════════════════════════════════════════════════════
pub mod dag;
pub mod pool;
pub mod protocol;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod registry;
pub mod store;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod engine;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

pub use ast::{BufferType, DepRef, TaskSpec, Workflow};
pub use buffer::SharedBuffer;
pub use config::EngineConfig;
pub use dag::{validate, DependencyCounter, TaskGraph};
pub use engine::Engine;
pub use error::{FixSuggestion, Result, RunaError};
pub use event::{Event, EventKind, EventLog};
pub use pool::{PoolStats, Runner, RunnerPool};
pub use protocol::{Envelope, ResolvedDep, RunnerRequest, RunnerResponse, TaskAssignment};
pub use registry::{TaskContext, TaskImpl, TaskRegistry};
pub use runtime::{Gate, Scheduler, WorkflowEvent, WorkflowStream};
pub use store::ResultStore;
