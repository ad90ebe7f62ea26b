//! Error types and handling for the bridge.
//!
//! Every domain owns its error enum; this module unifies them so the binary
//! and transports can propagate with `?`.

use thiserror::Error;

/// A specialized Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the tools domain.
    #[error("Tool error: {0}")]
    Tool(#[from] crate::domains::tools::ToolError),

    /// Error originating from the sessions domain.
    #[error("Session error: {0}")]
    Session(#[from] crate::domains::sessions::SessionError),

    /// Error originating from a worker channel.
    #[error("Worker error: {0}")]
    Worker(#[from] crate::domains::workers::WorkerError),

    /// Error originating from event dispatch.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::domains::dispatch::DispatchError),

    /// Error originating from the tool bridge.
    #[error("Bridge error: {0}")]
    Bridge(#[from] super::bridge::BridgeError),

    /// Error originating from a client transport.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal errors that should not occur under normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
