//! Error handling for the threading library.
//!
//! Every fallible operation returns [`ThreadResult`]. Errors are locally
//! recoverable: the call reports the failure and leaves the scheduler state
//! untouched.

use thiserror::Error;

use crate::thread::ThreadId;

/// Result type for threading operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Error type for all threading operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// An argument was out of range or otherwise unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is not permitted for the calling thread or in the
    /// library's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The referenced thread id has no live control block.
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),

    /// The control-block table is full; no further thread can be created.
    #[error("thread capacity exceeded")]
    CapacityExceeded,
}

impl ThreadError {
    /// Error kind as a short static label, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ThreadError::InvalidArgument(_) => "invalid-argument",
            ThreadError::InvalidOperation(_) => "invalid-operation",
            ThreadError::UnknownThread(_) => "unknown-thread",
            ThreadError::CapacityExceeded => "capacity-exceeded",
        }
    }
}
