//! HTTP transport implementation.
//!
//! JSON-RPC over POST with sessions carried in the `Mcp-Session-Id` header:
//!
//! - `initialize` admits a session (running the worker handshake when
//!   authentication is enabled) and returns its id in the response header.
//! - Later requests send the header back; unknown ids get 404.
//! - `DELETE <rpc path>` ends the session.
//! - Sessions idle longer than the configured timeout are reaped.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rmcp::ServerHandler;
use rmcp::model::{JsonObject, ListToolsResult};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

use super::{TransportError, TransportResult, config::HttpConfig};
use crate::core::McpServer;
use crate::core::bridge::{BridgeError, CREDENTIAL_TOKEN, ToolBridge, resolve_caller};
use crate::core::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::core::server::{META_SESSION_ID, to_mcp_error};
use crate::domains::sessions::TransportKind;
use crate::domains::workers::CallContext;

/// Session header name.
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

/// JSON-RPC error code for a refused or missing authorization.
pub const UNAUTHORIZED: i32 = -32001;

/// JSON-RPC error code for an unknown or expired session.
pub const SESSION_NOT_FOUND: i32 = -32002;

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    server: McpServer,
    rpc_path: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<JsonObject>,
    #[serde(default, rename = "_meta")]
    meta: Option<Map<String, Value>>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.listen.to_string()
    }

    /// Build the router for `server`.
    pub fn router(&self, server: McpServer) -> Router {
        let state = AppState {
            server,
            rpc_path: Arc::from(self.config.rpc_path.as_str()),
        };

        let mut app = Router::new()
            .route(&self.config.rpc_path, post(handle_rpc).delete(handle_delete))
            .route("/health", get(health_check))
            .route("/stats", get(stats))
            .route("/", get(root_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([SESSION_HEADER]);
            app = app.layer(cors);
        }
        app
    }

    /// Run the HTTP transport.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        let addr = self.address();
        let idle_timeout = server.config().clients.session_idle_timeout;
        let reaper = spawn_session_reaper(server.bridge().clone(), idle_timeout);
        let app = self.router(server);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!(
            "Ready - listening on {} (JSON-RPC over HTTP, CORS {})",
            addr, cors_status
        );
        info!("  → JSON-RPC: POST/DELETE {}", self.config.rpc_path);
        info!("  → Health:   GET /health");
        info!("  → Stats:    GET /stats");

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
        reaper.abort();

        served.map_err(|e| TransportError::Http(e.to_string()))
    }
}

/// Periodically expire idle sessions.
fn spawn_session_reaper(bridge: Arc<ToolBridge>, idle_timeout: Duration) -> JoinHandle<()> {
    let period = (idle_timeout / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let expired = bridge.expire_idle_sessions(idle_timeout);
            if !expired.is_empty() {
                info!(count = expired.len(), "Expired idle HTTP sessions");
            }
        }
    })
}

fn reply(status: StatusCode, response: JsonRpcResponse) -> Response {
    (status, Json(response)).into_response()
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Credentials a worker sees at authentication.
fn credentials(headers: &HeaderMap, addr: SocketAddr) -> BTreeMap<String, String> {
    let mut credentials = BTreeMap::new();
    credentials.insert("ip".to_string(), addr.ip().to_string());

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        credentials.insert(CREDENTIAL_TOKEN.to_string(), token.to_string());
    }

    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        credentials.insert("user_agent".to_string(), agent.to_string());
    }
    credentials
}

/// Root handler - provides API info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": state.server.name(),
        "version": state.server.version(),
        "transport": "HTTP",
        "endpoints": {
            "rpc": &*state.rpc_path,
            "health": "/health",
            "stats": "/stats"
        },
        "protocol": "JSON-RPC 2.0"
    }))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Metrics snapshot.
async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.server.bridge().snapshot())
}

/// End a session.
async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match session_header(&headers) {
        Some(id) if state.server.bridge().on_disconnect(&id) => StatusCode::NO_CONTENT,
        Some(_) => StatusCode::NOT_FOUND,
        None => StatusCode::BAD_REQUEST,
    }
}

/// Handle JSON-RPC requests.
#[instrument(skip_all, fields(method = tracing::field::Empty))]
async fn handle_rpc(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<JsonRpcRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                JsonRpcResponse::parse_error(e.body_text()),
            );
        }
    };
    tracing::Span::current().record("method", request.method.as_str());
    debug!("Received JSON-RPC request");

    if request.jsonrpc != "2.0" {
        return reply(StatusCode::OK, JsonRpcResponse::invalid_request(request.id));
    }

    match request.method.as_str() {
        "initialize" => handle_initialize(&state, request, &headers, addr).await,
        method if method.starts_with("notifications/") => {
            debug!("Received notification: {}", method);
            StatusCode::ACCEPTED.into_response()
        }
        _ => {
            let bridge = state.server.bridge();
            let session_id = match session_header(&headers) {
                Some(id) if bridge.sessions().contains(&id) => Some(id),
                Some(_) => {
                    return reply(
                        StatusCode::NOT_FOUND,
                        JsonRpcResponse::error(
                            request.id,
                            SESSION_NOT_FOUND,
                            "Unknown or expired session",
                        ),
                    );
                }
                None if bridge.settings().auth.required_for(TransportKind::Stream) => {
                    return reply(
                        StatusCode::UNAUTHORIZED,
                        JsonRpcResponse::error(request.id, UNAUTHORIZED, "Session required"),
                    );
                }
                None => None,
            };
            reply(
                StatusCode::OK,
                process_request(&state, request, session_id.as_deref()).await,
            )
        }
    }
}

/// Admit a new session.
async fn handle_initialize(
    state: &AppState,
    request: JsonRpcRequest,
    headers: &HeaderMap,
    addr: SocketAddr,
) -> Response {
    let bridge = state.server.bridge();
    let session_id = ToolBridge::new_session_id();

    let admitted = bridge
        .on_connect(
            &CallContext::new(),
            &session_id,
            TransportKind::Stream,
            credentials(headers, addr),
        )
        .await;

    match admitted {
        Ok(_) => {
            let info = state.server.get_info();
            let mut response = reply(StatusCode::OK, JsonRpcResponse::result(request.id, &info));
            if let Ok(value) = HeaderValue::from_str(&session_id) {
                response.headers_mut().insert(SESSION_HEADER, value);
            }
            response
        }
        Err(BridgeError::AuthenticationRejected(reason)) => reply(
            StatusCode::UNAUTHORIZED,
            JsonRpcResponse::error(request.id, UNAUTHORIZED, reason),
        ),
        Err(BridgeError::Session(e)) => reply(
            StatusCode::SERVICE_UNAVAILABLE,
            JsonRpcResponse::internal_error(request.id, e.to_string()),
        ),
        Err(e) => {
            warn!("Initialize failed: {}", e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                JsonRpcResponse::internal_error(request.id, e.category()),
            )
        }
    }
}

/// Process a request of an admitted (or anonymous) client.
async fn process_request(
    state: &AppState,
    request: JsonRpcRequest,
    session_id: Option<&str>,
) -> JsonRpcResponse {
    let bridge = state.server.bridge();

    match request.method.as_str() {
        "ping" => JsonRpcResponse::success(request.id, json!({})),

        "tools/list" => {
            let result = ListToolsResult::with_all_items(bridge.list_tools());
            JsonRpcResponse::result(request.id, &result)
        }

        "tools/call" => {
            let params: ToolCallParams =
                match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                    Ok(params) => params,
                    Err(e) => return JsonRpcResponse::invalid_params(request.id, e.to_string()),
                };

            let meta_session = params
                .meta
                .as_ref()
                .and_then(|meta| meta.get(META_SESSION_ID));
            let caller = resolve_caller(meta_session, session_id);

            match bridge
                .call_tool(CallContext::new(), caller, &params.name, params.arguments)
                .await
            {
                Ok(result) => JsonRpcResponse::result(request.id, &result),
                Err(e) => {
                    let error = to_mcp_error(&e);
                    JsonRpcResponse::error(request.id, error.code.0, error.message)
                }
            }
        }

        method => {
            warn!("Unknown method: {}", method);
            JsonRpcResponse::method_not_found(request.id)
        }
    }
}
