//! Control plane.
//!
//! The trusted side that owns the workers declares and removes tools here.
//! Requests are JSON-RPC 2.0, one per line over TCP, answered one per line:
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":1,"method":"mcp.DeclareTools","params":{"tools":[...]}}
//! <- {"jsonrpc":"2.0","id":1,"result":{"registered":["echo"],"updated":[]}}
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use super::bridge::ToolBridge;
use super::error::Result;
use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::transport::TransportError;
use crate::domains::tools::{DeclareOutcome, ToolDefinition};

pub const METHOD_DECLARE_TOOLS: &str = "mcp.DeclareTools";
pub const METHOD_REMOVE_TOOLS: &str = "mcp.RemoveTools";
pub const METHOD_STATS: &str = "mcp.Stats";

#[derive(Debug, Deserialize)]
struct DeclareToolsParams {
    tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoveToolsParams {
    Named { names: Vec<String> },
    Bare(Vec<String>),
}

impl RemoveToolsParams {
    fn into_names(self) -> Vec<String> {
        match self {
            Self::Named { names } | Self::Bare(names) => names,
        }
    }
}

/// Control-plane request handler.
#[derive(Clone)]
pub struct ControlPlane {
    bridge: Arc<ToolBridge>,
}

impl ControlPlane {
    pub fn new(bridge: Arc<ToolBridge>) -> Self {
        Self { bridge }
    }

    /// Handle one request.
    pub fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::invalid_request(request.id);
        }

        debug!(method = %request.method, "Control request");
        let params = request.params.unwrap_or(Value::Null);

        match request.method.as_str() {
            METHOD_DECLARE_TOOLS => match serde_json::from_value::<DeclareToolsParams>(params) {
                Ok(params) => {
                    let outcome = self.declare_tools(params.tools);
                    JsonRpcResponse::result(request.id, &outcome)
                }
                Err(e) => JsonRpcResponse::invalid_params(request.id, e.to_string()),
            },
            METHOD_REMOVE_TOOLS => match serde_json::from_value::<RemoveToolsParams>(params) {
                Ok(params) => {
                    self.bridge.remove_tools(&params.into_names());
                    JsonRpcResponse::success(request.id, json!({}))
                }
                Err(e) => JsonRpcResponse::invalid_params(request.id, e.to_string()),
            },
            METHOD_STATS => JsonRpcResponse::result(request.id, &self.bridge.snapshot()),
            method => {
                warn!("Unknown control method: {}", method);
                JsonRpcResponse::method_not_found(request.id)
            }
        }
    }

    /// Declare raw definitions, rejecting undecodable entries one by one.
    pub fn declare_tools(&self, entries: Vec<Value>) -> DeclareOutcome {
        let mut definitions = Vec::with_capacity(entries.len());
        let mut undecodable = Vec::new();

        for entry in entries {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match serde_json::from_value::<ToolDefinition>(entry) {
                Ok(definition) => definitions.push(definition),
                Err(e) => {
                    warn!(tool = %name, "Undecodable tool definition: {}", e);
                    undecodable.push((name, e.to_string()));
                }
            }
        }

        let mut outcome = self.bridge.declare_tools(definitions);
        for (name, reason) in undecodable {
            outcome.reject(name, reason);
        }
        outcome
    }

    /// Declare the tools listed in a `{"tools":[...]}` file.
    pub fn load_definitions_file(&self, path: &Path) -> Result<DeclareOutcome> {
        let content = std::fs::read_to_string(path)?;
        let params: DeclareToolsParams = serde_json::from_str(&content)?;
        let outcome = self.declare_tools(params.tools);
        info!(
            path = %path.display(),
            registered = outcome.registered.len(),
            rejected = outcome.rejected.len(),
            "Tool definitions loaded"
        );
        Ok(outcome)
    }

    /// Bind the control listener.
    pub async fn bind(addr: &str) -> std::result::Result<TcpListener, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::bind(addr, e))?;
        info!("Control plane listening on {}", addr);
        Ok(listener)
    }

    /// Serve control connections until the task is dropped.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let plane = self.clone();
                    tokio::spawn(async move {
                        plane.handle_connection(stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    warn!("Failed to accept control connection: {}", e);
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    #[instrument(skip(self, stream))]
    async fn handle_connection(self, stream: TcpStream, peer_addr: SocketAddr) {
        debug!("Control client connected");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Control connection read failed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) if request.is_notification() => {
                    self.handle(request);
                    continue;
                }
                Ok(request) => self.handle(request),
                Err(e) => JsonRpcResponse::parse_error(e.to_string()),
            };

            let mut out = match serde_json::to_vec(&response) {
                Ok(out) => out,
                Err(e) => {
                    warn!("Failed to encode control response: {}", e);
                    break;
                }
            };
            out.push(b'\n');
            if let Err(e) = writer.write_all(&out).await {
                warn!("Control connection write failed: {}", e);
                break;
            }
        }
        debug!("Control client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::BridgeSettings;
    use crate::domains::workers::LocalChannel;
    use std::io::Write;

    fn plane() -> ControlPlane {
        let channel = Arc::new(LocalChannel::replying(json!({})));
        ControlPlane::new(Arc::new(ToolBridge::new(channel, BridgeSettings::default())))
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(1, method, params)
    }

    #[test]
    fn test_declare_then_update() {
        let plane = plane();
        let tools = json!({ "tools": [{ "name": "t1", "description": "first" }] });

        let first = plane.handle(request(METHOD_DECLARE_TOOLS, tools));
        assert_eq!(first.result.unwrap(), json!({ "registered": ["t1"], "updated": [] }));

        let tools = json!({ "tools": [{ "name": "t1", "description": "second" }] });
        let second = plane.handle(request(METHOD_DECLARE_TOOLS, tools));
        assert_eq!(second.result.unwrap(), json!({ "registered": [], "updated": ["t1"] }));
    }

    #[test]
    fn test_bad_entry_does_not_abort_batch() {
        let plane = plane();
        let tools = json!({ "tools": [
            { "name": "good" },
            { "description": "no name" },
            { "name": "bad schema", "inputSchema": [] },
            42
        ] });

        let response = plane.handle(request(METHOD_DECLARE_TOOLS, tools));
        let outcome: DeclareOutcome = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(outcome.registered, vec!["good"]);
        assert_eq!(outcome.rejected.len(), 3);
        assert!(plane.bridge.tools().contains("good"));
    }

    #[test]
    fn test_remove_accepts_both_shapes() {
        let plane = plane();
        plane.declare_tools(vec![json!({ "name": "a" }), json!({ "name": "b" })]);

        let response = plane.handle(request(METHOD_REMOVE_TOOLS, json!({ "names": ["a"] })));
        assert_eq!(response.result.unwrap(), json!({}));

        let response = plane.handle(request(METHOD_REMOVE_TOOLS, json!(["b", "missing"])));
        assert!(response.error.is_none());
        assert!(plane.bridge.tools().is_empty());
    }

    #[test]
    fn test_error_codes() {
        let plane = plane();
        assert_eq!(plane.handle(request("mcp.Nope", json!({}))).error_code(), Some(-32601));
        assert_eq!(
            plane.handle(request(METHOD_DECLARE_TOOLS, json!({ "tools": "x" }))).error_code(),
            Some(-32602)
        );
        assert_eq!(
            plane.handle(request(METHOD_REMOVE_TOOLS, json!({ "names": 1 }))).error_code(),
            Some(-32602)
        );
    }

    #[test]
    fn test_stats() {
        let plane = plane();
        plane.declare_tools(vec![json!({ "name": "a" })]);
        let response = plane.handle(request(METHOD_STATS, Value::Null));
        assert_eq!(response.result.unwrap()["tools_registered"], 1);
    }

    #[test]
    fn test_load_definitions_file() {
        let plane = plane();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tools":[{{"name":"from_file","description":"d"}}]}}"#).unwrap();

        let outcome = plane.load_definitions_file(file.path()).unwrap();
        assert_eq!(outcome.registered, vec!["from_file"]);
    }

    #[tokio::test]
    async fn test_serve_line_protocol() {
        let plane = plane();
        let listener = ControlPlane::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bridge = plane.bridge.clone();
        tokio::spawn(plane.serve(listener));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"mcp.DeclareTools\",\"params\":{\"tools\":[{\"name\":\"echo\"}]}}\n")
            .await
            .unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, Some(json!(7)));
        assert!(bridge.tools().contains("echo"));

        writer.write_all(b"not json\n").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.error_code(), Some(-32700));
    }
}
