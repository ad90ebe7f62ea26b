//! Configuration management for the bridge.
//!
//! Values come from defaults, then a `.env` file, then `MCP_*` environment
//! variables. `Config::validate` rejects combinations the bridge cannot run
//! with.

use super::error::{Error, Result};
use super::transport::TransportConfig;
use crate::domains::workers::ProcessPoolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Main configuration structure for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Client-facing transport configuration.
    pub transport: TransportConfig,

    /// Worker pool configuration.
    pub pool: PoolConfig,

    /// Client session limits.
    pub clients: ClientsConfig,

    /// Tool routing and rendering.
    pub tools: ToolsConfig,

    /// Client authentication.
    pub auth: AuthConfig,

    /// Control-plane listener.
    pub control: ControlConfig,

    /// Metrics reporting.
    pub metrics: MetricsConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Worker program and arguments.
    pub command: Vec<String>,

    /// Number of worker processes.
    pub num_workers: usize,

    /// How long a call may wait for a free worker.
    pub allocate_timeout: Duration,

    /// Environment passed to every worker.
    pub env: Vec<(String, String)>,
}

/// Client session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    /// Maximum number of concurrent sessions.
    pub max_connections: usize,

    /// Sessions idle longer than this are dropped (HTTP only).
    pub session_idle_timeout: Duration,
}

/// Tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Send `tools/list_changed` to connected clients after declare/remove.
    pub notify_clients_on_change: bool,

    /// Upper bound for one tool call, queueing included.
    pub call_timeout: Duration,

    /// Render resource content as embedded resources instead of text.
    pub embed_resources: bool,

    /// JSON file of tool definitions declared at startup.
    pub definitions_file: Option<PathBuf>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Ask workers to authorize every connecting client.
    pub enabled: bool,

    /// Trust the local stdio pipe without asking.
    pub skip_for_stdio: bool,
}

/// Control-plane configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Listen address, `None` when disabled.
    pub address: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Period of the metrics log line, `None` when disabled.
    pub log_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            allocate_timeout: Duration::from_secs(60),
            env: vec![("MCP_MODE".to_string(), "worker".to_string())],
        }
    }
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            session_idle_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            notify_clients_on_change: true,
            call_timeout: Duration::from_secs(60),
            embed_resources: false,
            definitions_file: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            skip_for_stdio: true,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: Some("127.0.0.1:9334".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "worker-mcp-bridge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            transport: TransportConfig::default(),
            pool: PoolConfig::default(),
            clients: ClientsConfig::default(),
            tools: ToolsConfig::default(),
            auth: AuthConfig::default(),
            control: ControlConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `MCP_`.
    /// Unparseable values are reported and the default is kept.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.transport = TransportConfig::from_env();

        // Pool
        if let Ok(command) = std::env::var("MCP_POOL_COMMAND") {
            config.pool.command = ProcessPoolConfig::parse_command(&command);
        }
        env_parse("MCP_POOL_NUM_WORKERS", &mut config.pool.num_workers);
        env_duration("MCP_POOL_ALLOCATE_TIMEOUT", &mut config.pool.allocate_timeout);

        // Clients
        env_parse("MCP_MAX_CONNECTIONS", &mut config.clients.max_connections);
        env_duration(
            "MCP_SESSION_IDLE_TIMEOUT",
            &mut config.clients.session_idle_timeout,
        );

        // Tools
        env_parse(
            "MCP_NOTIFY_ON_CHANGE",
            &mut config.tools.notify_clients_on_change,
        );
        env_duration("MCP_TOOL_CALL_TIMEOUT", &mut config.tools.call_timeout);
        env_parse("MCP_EMBED_RESOURCES", &mut config.tools.embed_resources);
        if let Ok(path) = std::env::var("MCP_TOOLS_FILE") {
            config.tools.definitions_file = Some(PathBuf::from(path));
        }

        // Auth
        env_parse("MCP_AUTH_ENABLED", &mut config.auth.enabled);
        env_parse("MCP_AUTH_SKIP_FOR_STDIO", &mut config.auth.skip_for_stdio);

        // Control plane
        if let Ok(address) = std::env::var("MCP_CONTROL_ADDR") {
            config.control.address = match address.trim() {
                "" | "off" => None,
                addr => Some(addr.to_string()),
            };
        }

        // Metrics
        if let Ok(value) = std::env::var("MCP_METRICS_LOG_INTERVAL") {
            match parse_duration(&value) {
                Some(interval) => config.metrics.log_interval = Some(interval),
                None => warn!(value = %value, "Invalid MCP_METRICS_LOG_INTERVAL, metrics log disabled"),
            }
        }

        config
    }

    /// Check the configuration for values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.command.is_empty() {
            return Err(Error::config(
                "worker command is required (set MCP_POOL_COMMAND)",
            ));
        }
        if self.pool.num_workers == 0 {
            return Err(Error::config("pool.num_workers must be at least 1"));
        }
        if self.pool.allocate_timeout < Duration::from_millis(1) {
            return Err(Error::config("pool.allocate_timeout must be at least 1ms"));
        }
        if self.clients.max_connections == 0 {
            return Err(Error::config("clients.max_connections must be at least 1"));
        }
        if self.clients.session_idle_timeout < Duration::from_secs(1) {
            return Err(Error::config(
                "clients.session_idle_timeout must be at least 1s",
            ));
        }
        if self.tools.call_timeout < Duration::from_secs(1) {
            return Err(Error::config("tools.call_timeout must be at least 1s"));
        }
        if self.metrics.log_interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::config("metrics.log_interval must not be zero"));
        }
        Ok(())
    }
}

/// Parse a duration such as `250ms`, `30s`, `5m`, `1h` or bare seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: u64 = number.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(number)),
        "ms" => Some(Duration::from_millis(number)),
        "m" => Some(Duration::from_secs(number.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(number.checked_mul(3600)?)),
        _ => None,
    }
}

pub(crate) fn env_parse<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = std::env::var(name) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(variable = name, value = %value, "Invalid value, keeping default"),
        }
    }
}

fn env_duration(name: &str, target: &mut Duration) {
    if let Ok(value) = std::env::var(name) {
        match parse_duration(&value) {
            Some(parsed) => *target = parsed,
            None => warn!(variable = name, value = %value, "Invalid duration, keeping default"),
        }
    }
}
