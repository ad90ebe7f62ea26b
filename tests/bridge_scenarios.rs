//! End-to-end behavior of the bridge through its public API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rmcp::model::RawContent;
use serde_json::{Value, json};

use worker_mcp_bridge::core::bridge::{BridgeError, BridgeSettings, ToolBridge, UNKNOWN_SESSION};
use worker_mcp_bridge::core::control::{ControlPlane, METHOD_DECLARE_TOOLS};
use worker_mcp_bridge::core::jsonrpc::JsonRpcRequest;
use worker_mcp_bridge::domains::dispatch::DispatchError;
use worker_mcp_bridge::domains::sessions::{AuthPolicy, TransportKind};
use worker_mcp_bridge::domains::tools::ToolDefinition;
use worker_mcp_bridge::domains::workers::{
    CallContext, EventKind, HEADER_CLIENT_TOKEN, LocalChannel, WorkerError,
};

fn bridge(channel: LocalChannel) -> (Arc<ToolBridge>, Arc<LocalChannel>) {
    bridge_with(channel, BridgeSettings::default())
}

fn bridge_with(channel: LocalChannel, settings: BridgeSettings) -> (Arc<ToolBridge>, Arc<LocalChannel>) {
    let channel = Arc::new(channel);
    (Arc::new(ToolBridge::new(channel.clone(), settings)), channel)
}

fn tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, json!({ "type": "object" }))
}

fn text_of(content: &rmcp::model::Content) -> &str {
    match &content.raw {
        RawContent::Text(text) => &text.text,
        other => panic!("expected text content, got {:?}", other),
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let (bridge, channel) = bridge(LocalChannel::replying(json!({
        "content": [{ "type": "text", "text": "1" }],
        "isError": false
    })));
    bridge.declare_tools(vec![tool("echo", "Echo")]);

    let arguments = json!({ "x": 1 }).as_object().cloned();
    let result = bridge
        .call_tool(CallContext::new(), UNKNOWN_SESSION, "echo", arguments)
        .await
        .unwrap();

    assert_eq!(result.is_error, Some(false));
    assert_eq!(result.content.len(), 1);
    assert_eq!(text_of(&result.content[0]), "1");

    let envelope = &channel.history()[0];
    assert_eq!(envelope.event, EventKind::CallTool);
    let body: Value = serde_json::from_slice(&envelope.body).unwrap();
    assert_eq!(body["arguments"], json!({ "x": 1 }));
}

#[test]
fn redeclare_reports_update() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({})));

    let first = bridge.declare_tools(vec![tool("t1", "first")]);
    assert_eq!(first.registered, vec!["t1"]);
    assert!(first.updated.is_empty());

    let second = bridge.declare_tools(vec![tool("t1", "second")]);
    assert!(second.registered.is_empty());
    assert_eq!(second.updated, vec!["t1"]);

    let tools = bridge.list_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].description.as_deref(), Some("second"));
}

#[test]
fn repeated_declares_never_duplicate() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({})));
    let names = ["a", "b", "a", "c", "b", "a"];

    let mut seen = std::collections::HashSet::new();
    for name in names {
        let outcome = bridge.declare_tools(vec![tool(name, "")]);
        if seen.insert(name) {
            assert_eq!(outcome.registered, vec![name]);
        } else {
            assert_eq!(outcome.updated, vec![name]);
        }
    }
    assert_eq!(bridge.tools().len(), 3);
}

#[test]
fn removing_unknown_tool_is_noop() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({})));
    bridge.declare_tools(vec![tool("keep", "")]);

    let removed = bridge.remove_tools(&["ghost".to_string()]);
    assert!(removed.is_empty());
    assert!(bridge.tools().contains("keep"));
}

#[tokio::test]
async fn cancelled_call_never_reaches_worker() {
    let (bridge, channel) = bridge(LocalChannel::replying(json!({ "content": [] })));
    bridge.declare_tools(vec![tool("echo", "")]);

    let ctx = CallContext::new();
    ctx.cancel();
    let err = bridge.call_tool(ctx, "s1", "echo", None).await.unwrap_err();

    assert!(matches!(err, BridgeError::Dispatch(DispatchError::Cancelled)));
    assert_eq!(channel.sent(), 0);
}

#[tokio::test]
async fn tool_error_is_a_result() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({
        "content": [{ "type": "text", "text": "division by zero" }],
        "isError": true
    })));
    bridge.declare_tools(vec![tool("divide", "")]);

    let result = bridge
        .call_tool(CallContext::new(), "s1", "divide", None)
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(true));
    assert_eq!(text_of(&result.content[0]), "division by zero");
}

#[tokio::test]
async fn touch_on_missing_session_changes_nothing() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({})));
    assert!(!bridge.sessions().touch("nobody"));
    assert!(bridge.sessions().is_empty());
}

#[tokio::test]
async fn disabled_auth_authorizes_everyone() {
    let (bridge, channel) = bridge(LocalChannel::replying(json!({ "allowed": false })));

    for (i, transport) in [TransportKind::Stream, TransportKind::Pipe].into_iter().enumerate() {
        let mut credentials = BTreeMap::new();
        credentials.insert("token".to_string(), format!("garbage-{}", i));

        let state = bridge
            .on_connect(&CallContext::new(), &format!("s{}", i), transport, credentials)
            .await
            .unwrap();
        assert_eq!(state.token(), Some(""));
    }
    assert_eq!(channel.sent(), 0);
    assert_eq!(bridge.sessions().len(), 2);
}

#[tokio::test]
async fn no_worker_available_leaves_registries_alone() {
    let (bridge, _) = bridge(LocalChannel::failing(WorkerError::unavailable("pool exhausted")));
    bridge.declare_tools(vec![tool("echo", "")]);
    bridge
        .on_connect(&CallContext::new(), "s1", TransportKind::Stream, BTreeMap::new())
        .await
        .unwrap();

    let tools_before = bridge.tools().tool_names();
    let err = bridge.call_tool(CallContext::new(), "s1", "echo", None).await.unwrap_err();

    assert!(matches!(err, BridgeError::Dispatch(DispatchError::WorkerUnavailable(_))));
    assert_eq!(bridge.tools().tool_names(), tools_before);
    assert_eq!(bridge.sessions().len(), 1);
    assert!(bridge.sessions().contains("s1"));
}

#[tokio::test]
async fn unknown_content_type_renders_text() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({
        "content": [
            { "type": "resource", "text": "file body", "uri": "file:///a.txt" },
            { "type": "audio", "text": "transcript" }
        ]
    })));
    bridge.declare_tools(vec![tool("read", "")]);

    let result = bridge.call_tool(CallContext::new(), "s1", "read", None).await.unwrap();
    assert_eq!(text_of(&result.content[0]), "file body");
    assert_eq!(text_of(&result.content[1]), "transcript");
}

#[tokio::test]
async fn token_from_handshake_travels_with_calls() {
    let channel = LocalChannel::from_fn(|envelope| {
        let reply = match envelope.event {
            EventKind::ClientConnected => json!({ "allowed": true, "token": "session-token" }),
            EventKind::CallTool => json!({ "content": [] }),
        };
        Ok(Bytes::from(reply.to_string()))
    });
    let settings = BridgeSettings {
        auth: AuthPolicy {
            enabled: true,
            skip_for_stdio: true,
        },
        ..Default::default()
    };
    let (bridge, channel) = bridge_with(channel, settings);
    bridge.declare_tools(vec![tool("echo", "")]);

    let session = bridge
        .connect(&CallContext::new(), "s1", TransportKind::Stream, BTreeMap::new())
        .await
        .unwrap();
    bridge.call_tool(CallContext::new(), session.id(), "echo", None).await.unwrap();

    let history = channel.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].header(HEADER_CLIENT_TOKEN), None);
    assert_eq!(history[1].header(HEADER_CLIENT_TOKEN), Some("session-token"));

    drop(session);
    assert!(bridge.sessions().is_empty());
}

#[tokio::test]
async fn removal_does_not_abort_inflight_call() {
    let channel = LocalChannel::new(|_| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Bytes::from_static(br#"{"content":[{"type":"text","text":"done"}]}"#))
    });
    let (bridge, _) = bridge(channel);
    bridge.declare_tools(vec![tool("slow", "")]);

    let caller = bridge.clone();
    let call = tokio::spawn(async move {
        caller.call_tool(CallContext::new(), "s1", "slow", None).await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    bridge.remove_tools(&["slow".to_string()]);
    assert!(!bridge.tools().contains("slow"));

    let result = call.await.unwrap().unwrap();
    assert_eq!(text_of(&result.content[0]), "done");
}

#[tokio::test]
async fn slow_worker_does_not_block_declarations() {
    let channel = LocalChannel::new(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Bytes::from_static(b"{}"))
    });
    let (bridge, _) = bridge(channel);
    bridge.declare_tools(vec![tool("stuck", "")]);

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    let caller = bridge.clone();
    let call = tokio::spawn(async move { caller.call_tool(ctx, "s1", "stuck", None).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let outcome = tokio::time::timeout(Duration::from_millis(100), async {
        bridge.declare_tools(vec![tool("other", "")])
    })
    .await
    .unwrap();
    assert_eq!(outcome.registered, vec!["other"]);

    canceller.cancel();
    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.category(), "cancelled");
}

#[test]
fn control_plane_declare_is_per_entry() {
    let (bridge, _) = bridge(LocalChannel::replying(json!({})));
    let plane = ControlPlane::new(bridge.clone());

    let response = plane.handle(JsonRpcRequest::new(
        1,
        METHOD_DECLARE_TOOLS,
        json!({ "tools": [
            { "name": "ok", "description": "fine" },
            { "name": "", "description": "empty name" }
        ] }),
    ));
    let result = response.result.unwrap();
    assert_eq!(result["registered"], json!(["ok"]));
    assert_eq!(result["rejected"][0]["name"], "");
    assert!(bridge.tools().contains("ok"));
}
