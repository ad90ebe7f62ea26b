//! Client transports.
//!
//! Every transport admits clients through the bridge's session lifecycle
//! and hands them an [`McpServer`](crate::core::McpServer) bound to their
//! session:
//! - **stdio** (default): one `pipe` session, feature `stdio`
//! - **tcp**: one `stream` session per connection, feature `tcp`
//! - **http**: `stream` sessions keyed by the `Mcp-Session-Id` header,
//!   feature `http` (adds axum, tower, tower-http)

mod config;
mod error;
mod service;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use config::{ListenAddr, TransportConfig};
pub use error::{TransportError, TransportResult};
pub use service::TransportService;

#[cfg(feature = "tcp")]
pub use config::TcpConfig;

#[cfg(feature = "http")]
pub use config::HttpConfig;
