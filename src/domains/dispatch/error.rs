//! Dispatch error types.

use thiserror::Error;

use crate::domains::workers::WorkerError;

/// Failures of one dispatch round trip.
///
/// A tool result with `isError` set is not a dispatch error.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload could not be serialized. Never sent.
    #[error("Failed to encode event payload: {0}")]
    EncodingFailed(#[source] serde_json::Error),

    /// The pool had no usable worker.
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The worker answered with a body that does not decode.
    #[error("Invalid worker response: {0}")]
    InvalidWorkerResponse(String),

    /// The worker answered with an explicit error frame.
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

impl DispatchError {
    /// Stable short name, safe to show to clients and use as a metric label.
    pub fn category(&self) -> &'static str {
        match self {
            Self::EncodingFailed(_) => "encoding_failed",
            Self::WorkerUnavailable(_) => "worker_unavailable",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::InvalidWorkerResponse(_) => "invalid_worker_response",
            Self::WorkerFailed(_) => "worker_failed",
        }
    }
}

impl From<WorkerError> for DispatchError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Unavailable(msg) => Self::WorkerUnavailable(msg),
            WorkerError::Cancelled => Self::Cancelled,
            WorkerError::DeadlineExceeded => Self::DeadlineExceeded,
            WorkerError::Failed(msg) => Self::WorkerFailed(msg),
            WorkerError::Protocol(msg) => Self::InvalidWorkerResponse(msg),
        }
    }
}
