//! MCP server handler.
//!
//! `McpServer` is the rmcp `ServerHandler` for one client connection. It
//! advertises whatever workers have declared and forwards `tools/call` to the
//! bridge; it implements no tool itself.

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::bridge::{BridgeError, ToolBridge, resolve_caller};
use super::config::Config;
use crate::domains::workers::CallContext;

/// Call metadata key carrying an explicit session id.
pub const META_SESSION_ID: &str = "sessionId";

/// The MCP server handler.
#[derive(Clone)]
pub struct McpServer {
    /// Server configuration.
    config: Arc<Config>,

    /// The shared tool bridge.
    bridge: Arc<ToolBridge>,

    /// Session of the connection this handler serves, if any.
    session_id: Option<Arc<str>>,
}

impl McpServer {
    /// Create a handler not bound to a session.
    pub fn new(config: Arc<Config>, bridge: Arc<ToolBridge>) -> Self {
        Self {
            config,
            bridge,
            session_id: None,
        }
    }

    /// A copy of this handler bound to `session_id`.
    pub fn for_session(&self, session_id: &str) -> Self {
        Self {
            session_id: Some(Arc::from(session_id)),
            ..self.clone()
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    /// Get the server configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Get the tool bridge.
    pub fn bridge(&self) -> &Arc<ToolBridge> {
        &self.bridge
    }

    /// The session this handler is bound to.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Advertised capabilities.
    pub fn capabilities(&self) -> ServerCapabilities {
        if self.bridge.settings().notify_on_change {
            ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .build()
        } else {
            ServerCapabilities::builder().enable_tools().build()
        }
    }
}

/// Map a bridge failure to a protocol error without worker diagnostics.
pub fn to_mcp_error(err: &BridgeError) -> McpError {
    match err {
        BridgeError::Tool(e) => McpError::invalid_params(e.to_string(), None),
        other => McpError::internal_error(
            format!("tool invocation failed: {}", other.category()),
            None,
        ),
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Tools are declared and executed by backend workers; the tool list may change at runtime."
                    .to_string(),
            ),
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: self.config.server.name.clone(),
                version: self.config.server.version.clone(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }

    #[instrument(skip(self, _request, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self.bridge.list_tools();
        debug!(count = tools.len(), "Listing tools");
        Ok(ListToolsResult::with_all_items(tools))
    }

    #[instrument(skip(self, request, context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let caller = resolve_caller(context.meta.get(META_SESSION_ID), self.session_id.as_deref());
        let ctx = CallContext::with_cancellation(context.ct.clone());

        self.bridge
            .call_tool(ctx, caller, &request.name, request.arguments)
            .await
            .map_err(|e| to_mcp_error(&e))
    }
}
