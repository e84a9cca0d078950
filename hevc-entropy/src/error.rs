//! Error types for the entropy-coding backend.
//!
//! Every syntax encoder returns [`Result`]; the first failure inside a CTB
//! propagates straight up to the slice loop.

use thiserror::Error;

/// Entropy-coding error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntropyError {
    /// Writing would exceed the reserved bitstream capacity.
    ///
    /// Fatal for the slice segment in progress: the caller has to shrink the
    /// segment or grow the buffer and retry from a checkpoint.
    #[error("Bitstream buffer overflow: offset {offset} + {required} byte(s) exceeds capacity {capacity}")]
    BufferOverflow {
        /// Write offset at the time of the failed write.
        offset: usize,
        /// Bytes the failed operation needed.
        required: usize,
        /// Reserved capacity of the buffer.
        capacity: usize,
    },

    /// Syntax values that cannot be coded together.
    #[error("Invalid syntax combination: {0}")]
    InvalidSyntax(String),

    /// Invalid sequence/picture/slice configuration.
    #[error("Entropy config error: {0}")]
    Config(String),

    /// Internal state error.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl EntropyError {
    /// Returns true for the buffer-overflow condition.
    pub fn is_buffer_overflow(&self) -> bool {
        matches!(self, Self::BufferOverflow { .. })
    }

    pub(crate) fn syntax(msg: impl Into<String>) -> Self {
        Self::InvalidSyntax(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for entropy-coding operations.
pub type Result<T> = std::result::Result<T, EntropyError>;
