//! Runtime - scheduling and streaming
//!
//! - `gate`: one-shot readiness signal
//! - `scheduler`: per-task fibres + driver loop
//! - `stream`: caller-facing event sequence

mod gate;
mod scheduler;
mod stream;

pub use gate::Gate;
pub use scheduler::Scheduler;
pub use stream::{WorkflowEvent, WorkflowStream};
