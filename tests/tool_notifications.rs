//! Tool list change notifications delivered to connected MCP clients.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rmcp::service::{NotificationContext, RunningService};
use rmcp::{ClientHandler, RoleClient, RoleServer, ServiceExt};
use serde_json::json;
use tokio::sync::mpsc;

use worker_mcp_bridge::core::bridge::{BridgeSettings, ConnectedSession, ToolBridge};
use worker_mcp_bridge::core::{Config, McpServer};
use worker_mcp_bridge::domains::sessions::TransportKind;
use worker_mcp_bridge::domains::tools::ToolDefinition;
use worker_mcp_bridge::domains::workers::{CallContext, LocalChannel};

/// Counts `notifications/tools/list_changed` received by a client.
struct ListWatcher {
    changed: mpsc::UnboundedSender<()>,
}

impl ClientHandler for ListWatcher {
    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleClient>) {
        let _ = self.changed.send(());
    }
}

struct Connected {
    session: ConnectedSession,
    server: RunningService<RoleServer, McpServer>,
    client: RunningService<RoleClient, ListWatcher>,
    changed: mpsc::UnboundedReceiver<()>,
}

fn bridge(settings: BridgeSettings) -> Arc<ToolBridge> {
    let channel = Arc::new(LocalChannel::replying(json!({})));
    Arc::new(ToolBridge::new(channel, settings))
}

fn tool(name: &str) -> ToolDefinition {
    ToolDefinition::new(name, "", json!({ "type": "object" }))
}

/// Admit a session and run an MCP client against it over an in-memory pipe.
async fn connect(bridge: &Arc<ToolBridge>, session_id: &str) -> Connected {
    let session = bridge
        .connect(&CallContext::new(), session_id, TransportKind::Pipe, BTreeMap::new())
        .await
        .unwrap();

    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let handler = McpServer::new(Arc::new(Config::default()), bridge.clone()).for_session(session.id());
    let server = tokio::spawn(async move { handler.serve(server_io).await });

    let (tx, changed) = mpsc::unbounded_channel();
    let client = ListWatcher { changed: tx }.serve(client_io).await.unwrap();
    let server = server.await.unwrap().unwrap();
    bridge.attach_peer(session.id(), server.peer().clone());

    Connected {
        session,
        server,
        client,
        changed,
    }
}

#[tokio::test]
async fn declared_tools_notify_connected_clients() {
    let bridge = bridge(BridgeSettings::default());
    let mut first = connect(&bridge, "s1").await;
    let mut second = connect(&bridge, "s2").await;

    bridge.declare_tools(vec![tool("echo")]);

    for connected in [&mut first, &mut second] {
        let received = tokio::time::timeout(Duration::from_secs(5), connected.changed.recv()).await;
        assert_eq!(received.ok().flatten(), Some(()));
    }

    bridge.remove_tools(&["echo".to_string()]);
    let received = tokio::time::timeout(Duration::from_secs(5), first.changed.recv()).await;
    assert_eq!(received.ok().flatten(), Some(()));

    let listed = first.client.peer().list_all_tools().await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn notifications_can_be_disabled() {
    let bridge = bridge(BridgeSettings {
        notify_on_change: false,
        ..Default::default()
    });
    let mut connected = connect(&bridge, "s1").await;

    bridge.declare_tools(vec![tool("echo")]);

    let received = tokio::time::timeout(Duration::from_millis(200), connected.changed.recv()).await;
    assert!(received.is_err());
    assert_eq!(*bridge.subscribe_tool_changes().borrow(), 1);
}

#[tokio::test]
async fn failed_delivery_is_swallowed() {
    let bridge = bridge(BridgeSettings::default());
    let gone = connect(&bridge, "gone").await;
    let mut alive = connect(&bridge, "alive").await;

    let Connected { session, server, client, .. } = gone;
    client.cancel().await.unwrap();
    let _ = server.waiting().await;

    bridge.declare_tools(vec![tool("echo")]);
    let received = tokio::time::timeout(Duration::from_secs(5), alive.changed.recv()).await;
    assert_eq!(received.ok().flatten(), Some(()));

    bridge.declare_tools(vec![tool("other")]);
    let received = tokio::time::timeout(Duration::from_secs(5), alive.changed.recv()).await;
    assert_eq!(received.ok().flatten(), Some(()));
    assert_eq!(*bridge.subscribe_tool_changes().borrow(), 2);
    assert!(bridge.sessions().contains(session.id()));
}
