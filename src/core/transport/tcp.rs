//! TCP transport implementation.
//!
//! MCP over raw TCP sockets (line-delimited JSON-RPC), one session per
//! accepted connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use rmcp::ServiceExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, instrument, warn};

use super::{TransportError, TransportResult, config::TcpConfig};
use crate::core::McpServer;
use crate::core::bridge::ToolBridge;
use crate::domains::sessions::TransportKind;
use crate::domains::workers::CallContext;

/// TCP transport handler.
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    /// Create a new TCP transport with the given config.
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.listen.to_string()
    }

    /// Run the TCP transport.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        let addr = self.address();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!("Ready - listening on {} (MCP over TCP)", addr);
        Self::serve(listener, server).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(listener: TcpListener, server: McpServer) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    // Set TCP_NODELAY to disable Nagle's algorithm
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                    }

                    let server = server.clone();
                    tokio::spawn(async move {
                        Self::handle_connection(server, stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    // Small delay to avoid spinning on persistent errors
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Handle a single TCP connection as one session.
    #[instrument(skip(server, stream))]
    async fn handle_connection(server: McpServer, stream: TcpStream, peer_addr: SocketAddr) {
        let bridge = server.bridge().clone();
        let session_id = ToolBridge::new_session_id();

        let mut credentials = BTreeMap::new();
        credentials.insert("ip".to_string(), peer_addr.ip().to_string());

        // Dropping the stream refuses the connection.
        let session = match bridge
            .connect(&CallContext::new(), &session_id, TransportKind::Stream, credentials)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Refusing connection: {}", e);
                return;
            }
        };

        let service = match server.for_session(session.id()).serve(stream).await {
            Ok(service) => {
                info!(session_id = %session.id(), "Client connected, serving...");
                service
            }
            Err(e) => {
                warn!("Failed to initialize service: {}", e);
                return;
            }
        };

        bridge.attach_peer(session.id(), service.peer().clone());

        if let Err(e) = service.waiting().await {
            warn!("Error while serving client: {}", e);
        } else {
            info!(session_id = %session.id(), "Client disconnected cleanly");
        }
    }
}
