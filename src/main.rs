//! Worker MCP Bridge Entry Point
//!
//! Initializes logging, loads configuration, starts the worker pool and the
//! control plane, then serves MCP clients on the configured transport.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use worker_mcp_bridge::core::metrics::spawn_metrics_logger;
use worker_mcp_bridge::core::{
    BridgeSettings, Config, ControlPlane, McpServer, ToolBridge, TransportService,
};
use worker_mcp_bridge::domains::workers::{ProcessPool, ProcessPoolConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let config = Config::from_env();

    // Initialize logging
    init_logging(&config.logging.level);

    info!("Starting {} v{}", config.server.name, config.server.version);
    config.validate()?;

    // Start the worker pool
    let mut pool_config = ProcessPoolConfig::new(config.pool.command.clone());
    pool_config.num_workers = config.pool.num_workers;
    pool_config.allocate_timeout = config.pool.allocate_timeout;
    pool_config.env = config.pool.env.clone();
    let pool = ProcessPool::new(pool_config)?;
    pool.warm_up().context("failed to start workers")?;

    let bridge = Arc::new(ToolBridge::new(
        Arc::new(pool),
        BridgeSettings::from(&config),
    ));
    let control = ControlPlane::new(bridge.clone());

    if let Some(path) = &config.tools.definitions_file {
        control
            .load_definitions_file(path)
            .with_context(|| format!("failed to load tool definitions from {}", path.display()))?;
    }

    if let Some(addr) = &config.control.address {
        let listener = ControlPlane::bind(addr).await?;
        tokio::spawn(control.serve(listener));
    } else {
        info!("Control plane disabled");
    }

    let metrics_logger = config
        .metrics
        .log_interval
        .map(|interval| spawn_metrics_logger(bridge.clone(), interval));

    let config = Arc::new(config);
    let server = McpServer::new(config.clone(), bridge.clone());

    info!("Bridge initialized");

    // Run the transport until it ends or we are interrupted
    let transport = TransportService::new(config.transport.clone());
    let outcome = tokio::select! {
        result = transport.run(server) => result.context("transport failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    info!("Bridge shutting down");
    if let Some(handle) = metrics_logger {
        handle.abort();
    }
    bridge.shutdown().await;

    outcome
}

/// Initialize the logging subsystem.
///
/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
