//! Client transport settings.
//!
//! Each transport maps to one session [`TransportKind`]: stdio carries a
//! single `pipe` session, tcp and http open one `stream` session per client.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg(any(feature = "tcp", feature = "http"))]
use crate::core::config::env_parse;
use crate::domains::sessions::TransportKind;

#[cfg(not(any(feature = "stdio", feature = "tcp", feature = "http")))]
compile_error!("At least one transport feature must be enabled: stdio, tcp, or http");

#[cfg(any(feature = "tcp", feature = "http"))]
const DEFAULT_HOST: &str = "127.0.0.1";

/// Host and port a network transport listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenAddr {
    pub host: String,
    pub port: u16,
}

impl ListenAddr {
    #[cfg(any(feature = "tcp", feature = "http"))]
    fn local(port: u16) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
        }
    }

    /// Apply `<prefix>_HOST` and `<prefix>_PORT` overrides.
    #[cfg(any(feature = "tcp", feature = "http"))]
    fn override_from_env(&mut self, prefix: &str) {
        if let Ok(host) = std::env::var(format!("{}_HOST", prefix)) {
            self.host = host;
        }
        env_parse(&format!("{}_PORT", prefix), &mut self.port);
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The transport clients connect through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// One client over standard input/output.
    #[cfg(feature = "stdio")]
    Stdio,

    /// MCP over raw TCP, one client per connection.
    #[cfg(feature = "tcp")]
    Tcp(TcpConfig),

    /// JSON-RPC over HTTP POST with a session header.
    #[cfg(feature = "http")]
    Http(HttpConfig),
}

#[cfg(feature = "tcp")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    pub listen: ListenAddr,
}

#[cfg(feature = "tcp")]
impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen: ListenAddr::local(3000),
        }
    }
}

#[cfg(feature = "tcp")]
impl TcpConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        config.listen.override_from_env("MCP_TCP");
        config
    }
}

#[cfg(feature = "http")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub listen: ListenAddr,

    /// Path of the JSON-RPC endpoint.
    pub rpc_path: String,

    /// Allow browser clients from any origin.
    pub enable_cors: bool,
}

#[cfg(feature = "http")]
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: ListenAddr::local(8080),
            rpc_path: "/mcp".to_string(),
            enable_cors: true,
        }
    }
}

#[cfg(feature = "http")]
impl HttpConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        config.listen.override_from_env("MCP_HTTP");
        if let Ok(path) = std::env::var("MCP_HTTP_PATH") {
            config.rpc_path = path;
        }
        env_parse("MCP_HTTP_CORS", &mut config.enable_cors);
        config
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        #[cfg(feature = "stdio")]
        let config = Self::Stdio;
        #[cfg(all(not(feature = "stdio"), feature = "tcp"))]
        let config = Self::Tcp(TcpConfig::default());
        #[cfg(all(not(feature = "stdio"), not(feature = "tcp"), feature = "http"))]
        let config = Self::Http(HttpConfig::default());
        config
    }
}

impl TransportConfig {
    /// Select the transport named by `MCP_TRANSPORT`.
    ///
    /// An empty or unknown name (or one whose feature is not compiled in)
    /// falls back to the default transport.
    pub fn from_env() -> Self {
        let name = std::env::var("MCP_TRANSPORT").unwrap_or_default();
        if let Some(config) = Self::named(&name) {
            return config;
        }
        if !name.trim().is_empty() {
            warn!(transport = %name, "Unknown or disabled transport, using default");
        }

        match Self::default() {
            #[cfg(feature = "tcp")]
            Self::Tcp(_) => Self::Tcp(TcpConfig::from_env()),
            #[cfg(feature = "http")]
            Self::Http(_) => Self::Http(HttpConfig::from_env()),
            #[allow(unreachable_patterns)]
            other => other,
        }
    }

    fn named(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            #[cfg(feature = "stdio")]
            "stdio" => Some(Self::Stdio),
            #[cfg(feature = "tcp")]
            "tcp" => Some(Self::Tcp(TcpConfig::from_env())),
            #[cfg(feature = "http")]
            "http" => Some(Self::Http(HttpConfig::from_env())),
            _ => None,
        }
    }

    /// Human readable form for the startup log.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (single pipe session)".to_string(),
            #[cfg(feature = "tcp")]
            Self::Tcp(cfg) => format!("TCP on {}", cfg.listen),
            #[cfg(feature = "http")]
            Self::Http(cfg) => format!("HTTP on {}{}", cfg.listen, cfg.rpc_path),
        }
    }

    /// Session transport kind of clients on this transport.
    pub fn kind(&self) -> TransportKind {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => TransportKind::Pipe,
            #[allow(unreachable_patterns)]
            _ => TransportKind::Stream,
        }
    }
}
