//! Event sourcing - append-only execution audit trail

mod log;

pub use log::{Event, EventKind, EventLog};
