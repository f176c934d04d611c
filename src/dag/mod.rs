//! DAG structure - validation and dependency counting
//!
//! - `validate`: duplicate/missing/cycle checks, TaskGraph materialisation
//! - `counter`: per-task unresolved-dependency counter

mod counter;
mod validate;

pub use counter::DependencyCounter;
pub use validate::{validate, DepVec, TaskGraph};
