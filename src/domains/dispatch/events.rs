//! Typed events and their worker responses.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domains::tools::ContentItem;
use crate::domains::workers::EventKind;

/// A payload that can be dispatched to a worker.
pub trait Event: Serialize + Send + Sync {
    /// Event kind announced in the envelope headers.
    const KIND: EventKind;

    /// Shape the worker answers with.
    type Response: DeserializeOwned + Send;
}

// ============================================================================
// ClientConnected
// ============================================================================

/// Sent when a client connects and authentication is required.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnected {
    pub session_id: String,
    pub credentials: BTreeMap<String, String>,
}

/// Worker verdict on a connecting client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConnectedResponse {
    pub allowed: bool,

    /// Token stored with the session and attached to later envelopes.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub message: String,
}

impl Event for ClientConnected {
    const KIND: EventKind = EventKind::ClientConnected;
    type Response = ClientConnectedResponse;
}

// ============================================================================
// CallTool
// ============================================================================

/// Sent for every tool invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTool {
    pub session_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Tool result produced by a worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResponse {
    #[serde(default)]
    pub content: Vec<ContentItem>,

    /// Tool-level failure; still a successful exchange.
    #[serde(default)]
    pub is_error: bool,
}

impl Event for CallTool {
    const KIND: EventKind = EventKind::CallTool;
    type Response = CallToolResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_tool_payload_shape() {
        let payload = CallTool {
            session_id: "s1".into(),
            tool_name: "echo".into(),
            arguments: json!({ "x": 1 }),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "sessionId": "s1", "toolName": "echo", "arguments": { "x": 1 } })
        );
    }

    #[test]
    fn test_client_connected_response_defaults() {
        let response: ClientConnectedResponse =
            serde_json::from_value(json!({ "allowed": true })).unwrap();
        assert!(response.allowed);
        assert!(response.token.is_empty());
        assert!(response.message.is_empty());
    }

    #[test]
    fn test_call_tool_response_defaults() {
        let response: CallToolResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.content.is_empty());
        assert!(!response.is_error);
    }
}
