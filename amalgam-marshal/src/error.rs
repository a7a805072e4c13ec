//! Error types for the marshaling layer.

use crate::memory::NativePtr;
use thiserror::Error;

/// Result type for marshaling operations.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Errors that can occur while moving values across the native boundary.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// The native allocator could not satisfy a request.
    #[error("out of native memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: u64 },

    /// An access fell outside the native linear memory.
    #[error("native memory access out of bounds: {len} bytes at {ptr}")]
    OutOfBounds { ptr: NativePtr, len: u64 },

    /// A native string was not valid UTF-8.
    #[error("native string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A native string was not NUL-terminated inside the linear memory.
    #[error("unterminated native string at {0}")]
    Unterminated(NativePtr),

    /// The native allocator itself failed (e.g. trapped).
    #[error("native allocator failure: {0}")]
    Allocator(String),
}
