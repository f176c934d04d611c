//! Buffer type tags
//!
//! Every task output is a typed binary buffer. The tag determines the
//! element width; buffer lengths must be whole multiples of that width.

use serde::{Deserialize, Serialize};

use crate::error::RunaError;

/// Element type of a task's output buffer.
///
/// The wire representation is the snake_case tag string (`"float32"`,
/// `"uint8_clamped"`, ...). `tag → BufferType → tag` is the identity over
/// the enumerated set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferType {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    #[default]
    Uint8,
    Uint8Clamped,
    Uint16,
    Uint32,
    Bigint64,
    Biguint64,
}

impl BufferType {
    /// Every supported tag, in declaration order
    pub const ALL: [BufferType; 11] = [
        BufferType::Float32,
        BufferType::Float64,
        BufferType::Int8,
        BufferType::Int16,
        BufferType::Int32,
        BufferType::Uint8,
        BufferType::Uint8Clamped,
        BufferType::Uint16,
        BufferType::Uint32,
        BufferType::Bigint64,
        BufferType::Biguint64,
    ];

    /// Element width in bytes
    pub fn element_size(&self) -> usize {
        match self {
            BufferType::Int8 | BufferType::Uint8 | BufferType::Uint8Clamped => 1,
            BufferType::Int16 | BufferType::Uint16 => 2,
            BufferType::Float32 | BufferType::Int32 | BufferType::Uint32 => 4,
            BufferType::Float64 | BufferType::Bigint64 | BufferType::Biguint64 => 8,
        }
    }

    /// The wire tag string
    pub fn tag(&self) -> &'static str {
        match self {
            BufferType::Float32 => "float32",
            BufferType::Float64 => "float64",
            BufferType::Int8 => "int8",
            BufferType::Int16 => "int16",
            BufferType::Int32 => "int32",
            BufferType::Uint8 => "uint8",
            BufferType::Uint8Clamped => "uint8_clamped",
            BufferType::Uint16 => "uint16",
            BufferType::Uint32 => "uint32",
            BufferType::Bigint64 => "bigint64",
            BufferType::Biguint64 => "biguint64",
        }
    }

    /// Parse a wire tag string
    pub fn from_tag(tag: &str) -> Result<Self, RunaError> {
        Self::ALL
            .iter()
            .find(|t| t.tag() == tag)
            .copied()
            .ok_or_else(|| RunaError::UnknownBufferTag {
                tag: tag.to_string(),
            })
    }

    /// Check a buffer length against the element width
    pub fn accepts_len(&self, len: usize) -> bool {
        len % self.element_size() == 0
    }
}

impl std::fmt::Display for BufferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
