//! Worker channel error types.

use thiserror::Error;

/// Transport and infrastructure failures of a worker round trip.
///
/// A worker that answers with a tool-level error is not a failure here; that
/// answer travels inside the response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// No usable worker: pool exhausted, shut down, or the worker crashed.
    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The worker answered with an explicit error frame.
    #[error("Worker reported an error: {0}")]
    Failed(String),

    /// The worker answered with something that is not a valid frame.
    #[error("Worker protocol violation: {0}")]
    Protocol(String),
}

impl WorkerError {
    /// Create an "unavailable" error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a "protocol" error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
