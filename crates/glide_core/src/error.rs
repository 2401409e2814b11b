//! Error types for glide_core

use thiserror::Error;

/// Errors raised by core value and sink operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Two buffers that must be the same size are not
    #[error("buffer length mismatch: expected {expected} bytes, got {actual}")]
    BufferLengthMismatch { expected: usize, actual: usize },
}

/// Result type for glide_core operations
pub type Result<T> = std::result::Result<T, CoreError>;
