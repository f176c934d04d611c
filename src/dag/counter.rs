//! DependencyCounter - per-task unresolved-dependency counts
//!
//! Counts are non-negative and decremented exactly as dependencies
//! publish their outputs. Underflow or an unknown id on decrement is a
//! structural bug in the scheduler, not a user error, and halts the
//! engine.

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Per-task integer counter of unresolved dependencies
#[derive(Debug, Default)]
pub struct DependencyCounter {
    counts: FxHashMap<Arc<str>, u32>,
}

impl DependencyCounter {
    /// Initialise every key at zero
    pub fn init<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Arc<str>>,
    {
        Self {
            counts: keys.into_iter().map(|k| (k, 0)).collect(),
        }
    }

    /// Set a count outright
    pub fn set(&mut self, id: Arc<str>, n: u32) {
        self.counts.insert(id, n);
    }

    /// Increment a count by `by`
    ///
    /// # Panics
    /// If the id is unknown.
    pub fn increment(&mut self, id: &str, by: u32) {
        let count = self
            .counts
            .get_mut(id)
            .unwrap_or_else(|| panic!("increment on unknown task '{id}'"));
        *count += by;
    }

    /// Decrement a count by one, returning the new value.
    ///
    /// # Panics
    /// If the id is unknown or the count is already zero.
    pub fn decrement(&mut self, id: &str) -> u32 {
        let count = self
            .counts
            .get_mut(id)
            .unwrap_or_else(|| panic!("decrement on unknown task '{id}'"));
        assert!(*count > 0, "dependency count underflow for task '{id}'");
        *count -= 1;
        *count
    }

    pub fn get(&self, id: &str) -> Option<u32> {
        self.counts.get(id).copied()
    }

    pub fn is_zero(&self, id: &str) -> bool {
        self.counts.get(id).is_some_and(|&c| c == 0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over (id, count) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, u32)> {
        self.counts.iter().map(|(k, &v)| (k, v))
    }
}
