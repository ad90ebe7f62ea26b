//! STDIO transport implementation.
//!
//! A single trusted `pipe` session over standard input/output.

use std::collections::BTreeMap;

use rmcp::ServiceExt;
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::McpServer;
use crate::core::bridge::ToolBridge;
use crate::domains::sessions::TransportKind;
use crate::domains::workers::CallContext;

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Run the STDIO transport until stdin closes.
    pub async fn run(server: McpServer) -> TransportResult<()> {
        let bridge = server.bridge().clone();
        let session_id = ToolBridge::new_session_id();

        let session = bridge
            .connect(
                &CallContext::new(),
                &session_id,
                TransportKind::Pipe,
                BTreeMap::new(),
            )
            .await?;

        info!(session_id = %session.id(), "Ready - communicating via stdin/stdout");

        let service = server
            .for_session(session.id())
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        bridge.attach_peer(session.id(), service.peer().clone());

        service
            .waiting()
            .await
            .map_err(|e| TransportError::Service(e.to_string()))?;

        info!("STDIO transport finished");
        Ok(())
    }
}
