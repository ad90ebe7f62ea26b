//! Session-specific error types.

use thiserror::Error;

/// Errors that can occur while admitting a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The configured connection limit is reached.
    #[error("Connection limit of {limit} sessions reached")]
    CapacityReached { limit: usize },
}
