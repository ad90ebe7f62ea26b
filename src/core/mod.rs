//! Core module containing shared infrastructure components.
//!
//! Configuration, error handling, the tool bridge that ties the domains
//! together, the control plane, metrics, the MCP handler and the client
//! transports.

pub mod bridge;
pub mod config;
pub mod control;
pub mod error;
pub mod jsonrpc;
pub mod metrics;
pub mod server;
pub mod transport;

pub use bridge::{BridgeError, BridgeSettings, ToolBridge};
pub use config::Config;
pub use control::ControlPlane;
pub use error::{Error, Result};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use server::McpServer;
pub use transport::{TransportConfig, TransportService};
