//! Worker MCP Bridge Library
//!
//! An MCP server whose tools are declared and executed by a pool of
//! out-of-process workers. The bridge keeps the tool routing table and the
//! client sessions, and turns every `tools/call` into exactly one
//! request/response exchange with one worker.
//!
//! # Architecture
//!
//! - **core**: configuration, errors, the tool bridge, control plane, metrics,
//!   the MCP handler and transports
//! - **domains**: the bridge core
//!   - **tools**: tool registry and content rendering
//!   - **sessions**: session registry and authentication
//!   - **workers**: worker channel, process pool, in-process channel
//!   - **dispatch**: typed events and the event dispatcher
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use worker_mcp_bridge::core::{BridgeSettings, Config, McpServer, ToolBridge};
//! use worker_mcp_bridge::domains::workers::{ProcessPool, ProcessPoolConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_env();
//! let pool = ProcessPool::new(ProcessPoolConfig::new(config.pool.command.clone()))?;
//! let bridge = Arc::new(ToolBridge::new(Arc::new(pool), BridgeSettings::from(&config)));
//! let server = McpServer::new(Arc::new(config), bridge);
//! // Hand `server` to a transport...
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result, ToolBridge};
