//! Transport error types.

use thiserror::Error;

use crate::core::bridge::BridgeError;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures of a client transport or listener.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bridge refused the client's session.
    #[error("Connection rejected: {0}")]
    Rejected(#[from] BridgeError),

    /// The MCP initialize handshake with the client failed.
    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error("HTTP server error: {0}")]
    Http(String),

    /// The rmcp service ended with an error.
    #[error("Service error: {0}")]
    Service(String),
}

impl TransportError {
    /// Create a bind error.
    pub fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sessions::SessionError;

    #[test]
    fn test_rejection_wraps_bridge_error() {
        let err: TransportError = BridgeError::from(SessionError::CapacityReached { limit: 2 }).into();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert!(err.to_string().starts_with("Connection rejected"));
    }
}
