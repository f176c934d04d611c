//! SharedBuffer - write-once, multi-reader byte region
//!
//! Task outputs are published exactly once and then shared read-only
//! between the scheduler and whichever runner consumes them as inputs.
//! `Arc<[u8]>` gives zero-copy sharing across threads.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Reference-counted immutable byte buffer.
///
/// Cloning is O(1); the bytes are never copied after publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBuffer {
    bytes: Arc<[u8]>,
}

impl SharedBuffer {
    /// Publish a buffer from freshly produced bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    /// Copy a slice into a new buffer
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl Serialize for SharedBuffer {
    /// Serialises as a sequence of byte values (JSON: array of numbers)
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.bytes.iter())
    }
}
