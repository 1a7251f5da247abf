//! Error types for conversion operations
//!
//! Malformed Markdown is never an error: every byte sequence maps to some
//! document. The only failures are resource related, plus misuse of the C
//! ABI (NULL input with a non-zero length). Messages are `&'static str` so
//! that reporting a failure never needs another allocation.

use allocator_api2::collections::TryReserveError;
use thiserror::Error;

/// Errors that can occur during Markdown to HTML conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The allocator refused a request
    #[error("Memory allocation failed")]
    OutOfMemory,
    /// A computed buffer size does not fit in `usize`
    #[error("Buffer size overflow")]
    Overflow,
    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),
    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(&'static str),
}

impl ConversionError {
    /// Get numeric error code
    pub fn code(&self) -> u32 {
        match self {
            ConversionError::OutOfMemory => 4,
            ConversionError::Overflow => 6,
            ConversionError::InvalidInput(_) => 5,
            ConversionError::InternalError(_) => 99,
        }
    }
}

impl From<TryReserveError> for ConversionError {
    fn from(_: TryReserveError) -> Self {
        // Capacity overflow and allocator refusal are both reported as
        // exhaustion to the caller.
        ConversionError::OutOfMemory
    }
}
