//! Utilities - string interning
//!
//! Small cross-cutting helpers with no domain knowledge.

mod interner;

pub use interner::{intern, intern_arc, Interner};
