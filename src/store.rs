//! Task output storage with DashMap
//!
//! Outputs are published once per task and read concurrently by the
//! fibres resolving dependent tasks' inputs.

use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use crate::buffer::SharedBuffer;

/// Thread-safe storage for published task outputs (lock-free)
#[derive(Clone, Default)]
pub struct ResultStore {
    /// task_id → output buffer
    results: Arc<DashMap<Arc<str>, SharedBuffer>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a task's output. A task publishes exactly once.
    pub fn insert(&self, task_id: Arc<str>, output: SharedBuffer) {
        let previous = self.results.insert(task_id, output);
        debug_assert!(previous.is_none(), "task output published twice");
    }

    /// Get a task's output (O(1) clone of the buffer handle)
    pub fn get(&self, task_id: &str) -> Option<SharedBuffer> {
        self.results.get(task_id).map(|r| r.clone())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.results.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Snapshot every published output, for the final stream event
    pub fn snapshot(&self) -> FxHashMap<Arc<str>, SharedBuffer> {
        self.results
            .iter()
            .map(|entry| (Arc::clone(entry.key()), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::intern;

    #[test]
    fn insert_and_get() {
        let store = ResultStore::new();
        store.insert(intern("a"), SharedBuffer::new(vec![1, 2]));

        assert!(store.contains("a"));
        assert_eq!(store.get("a").unwrap().as_slice(), &[1, 2]);
        assert!(store.get("b").is_none());
    }

    #[test]
    fn snapshot_contains_all_outputs() {
        let store = ResultStore::new();
        store.insert(intern("a"), SharedBuffer::new(vec![0]));
        store.insert(intern("b"), SharedBuffer::new(vec![1]));

        let snap = store.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[&intern("b")].as_slice(), &[1]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "published twice")]
    fn double_publish_is_a_structural_bug() {
        let store = ResultStore::new();
        store.insert(intern("a"), SharedBuffer::new(vec![0]));
        store.insert(intern("a"), SharedBuffer::new(vec![1]));
    }
}
