//! The tool bridge.
//!
//! Wires the tool registry, the session registry and the event dispatcher
//! together. Transports call into it for session lifecycle and tool calls;
//! the control plane calls into it to declare and remove tools.
//!
//! Registry locks only guard map mutation. No lock is held while a call waits
//! on a worker, so a stuck worker never stalls declaration, removal or
//! unrelated calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use rmcp::{Peer, RoleServer};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::config::Config;
use super::metrics::{BridgeMetrics, MetricsSnapshot, OUTCOME_SUCCESS, OUTCOME_TOOL_ERROR};
use crate::domains::dispatch::{DispatchError, EventDispatcher};
use crate::domains::sessions::{
    AuthPolicy, AuthState, Caller, SessionError, SessionRegistry, TransportKind,
};
use crate::domains::tools::{DeclareOutcome, RenderPolicy, ToolDefinition, ToolError, ToolRegistry};
use crate::domains::workers::{CallContext, WorkerChannel};

/// Session id used when a call carries none.
pub const UNKNOWN_SESSION: &str = "unknown";

/// Credential key holding a bearer token. Never stored in session metadata.
pub const CREDENTIAL_TOKEN: &str = "token";

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the bridge to transports.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The connection must be refused; the session was never tracked.
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl BridgeError {
    /// Stable short name, safe to show to clients.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Tool(_) => "tool_not_found",
            Self::Dispatch(e) => e.category(),
            Self::AuthenticationRejected(_) => "authentication_rejected",
            Self::Session(_) => "capacity_reached",
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Runtime settings of the bridge.
#[derive(Debug, Clone, Copy)]
pub struct BridgeSettings {
    /// Notify connected clients when the tool set changes.
    pub notify_on_change: bool,

    /// How worker content is rendered.
    pub render: RenderPolicy,

    /// Upper bound of one tool call or authentication round trip.
    pub call_timeout: Duration,

    pub auth: AuthPolicy,

    pub max_connections: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            notify_on_change: true,
            render: RenderPolicy::default(),
            call_timeout: Duration::from_secs(60),
            auth: AuthPolicy::default(),
            max_connections: 100,
        }
    }
}

impl From<&Config> for BridgeSettings {
    fn from(config: &Config) -> Self {
        Self {
            notify_on_change: config.tools.notify_clients_on_change,
            render: RenderPolicy {
                embed_resources: config.tools.embed_resources,
            },
            call_timeout: config.tools.call_timeout,
            auth: AuthPolicy {
                enabled: config.auth.enabled,
                skip_for_stdio: config.auth.skip_for_stdio,
            },
            max_connections: config.clients.max_connections,
        }
    }
}

// ============================================================================
// Tool Bridge
// ============================================================================

/// The bridge between MCP clients and workers.
pub struct ToolBridge {
    settings: BridgeSettings,
    tools: ToolRegistry,
    sessions: Arc<SessionRegistry>,
    dispatcher: EventDispatcher,
    metrics: BridgeMetrics,
    peers: DashMap<String, Peer<RoleServer>>,
    changes: watch::Sender<u64>,
    /// Handshakes in flight; they count against the session limit.
    admitting: Mutex<usize>,
}

/// A session slot held while a connection is being admitted.
struct Admission<'a> {
    admitting: &'a Mutex<usize>,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        let mut admitting = self.admitting.lock();
        *admitting = admitting.saturating_sub(1);
    }
}

impl ToolBridge {
    /// Create a bridge sending every event over `channel`.
    pub fn new(channel: Arc<dyn WorkerChannel>, settings: BridgeSettings) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let (changes, _) = watch::channel(0);

        Self {
            settings,
            tools: ToolRegistry::new(),
            dispatcher: EventDispatcher::new(channel, sessions.clone()),
            sessions,
            metrics: BridgeMetrics::new(),
            peers: DashMap::new(),
            changes,
            admitting: Mutex::new(0),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// A fresh session identifier.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    // ========================================================================
    // Tool declaration
    // ========================================================================

    /// Declare or update tools. Malformed entries are rejected individually.
    pub fn declare_tools(&self, definitions: Vec<ToolDefinition>) -> DeclareOutcome {
        let outcome = self.tools.declare(definitions);
        info!(
            registered = outcome.registered.len(),
            updated = outcome.updated.len(),
            rejected = outcome.rejected.len(),
            "Tools declared"
        );
        for rejected in &outcome.rejected {
            warn!(tool = %rejected.name, reason = %rejected.reason, "Tool definition rejected");
        }

        if outcome.changed() {
            self.tools_changed();
        }
        outcome
    }

    /// Remove tools by name. Unknown names are ignored.
    pub fn remove_tools(&self, names: &[String]) -> Vec<String> {
        let removed = self.tools.remove(names);
        info!(requested = names.len(), removed = removed.len(), "Tools removed");

        if !removed.is_empty() {
            self.tools_changed();
        }
        removed
    }

    /// Currently advertised tools.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.list()
    }

    /// Watch the tool set version; it increases on every change.
    pub fn subscribe_tool_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Bump the tool set version and notify connected peers.
    ///
    /// Delivery is best effort: it runs in a spawned task, failures are
    /// logged and never reach the caller.
    fn tools_changed(&self) {
        self.changes.send_modify(|version| *version += 1);

        if !self.settings.notify_on_change {
            return;
        }

        let peers: Vec<(String, Peer<RoleServer>)> = self
            .peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if peers.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (session_id, peer) in peers {
                        if let Err(e) = peer.notify_tool_list_changed().await {
                            warn!(session_id = %session_id, "Failed to notify tool list change: {}", e);
                        }
                    }
                });
            }
            Err(_) => warn!("No runtime available, tool list change not delivered"),
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Admit a new session.
    ///
    /// Runs the worker handshake when the transport requires it. Only an
    /// authorized session is tracked; any other outcome refuses the connection.
    /// A slot is reserved before the handshake, so concurrent connects never
    /// exceed `max_connections`.
    #[instrument(skip(self, ctx, credentials), fields(transport = %transport))]
    pub async fn on_connect(
        &self,
        ctx: &CallContext,
        session_id: &str,
        transport: TransportKind,
        credentials: BTreeMap<String, String>,
    ) -> Result<AuthState, BridgeError> {
        let _admission = self.reserve_slot(session_id)?;

        let metadata: Map<String, Value> = credentials
            .iter()
            .filter(|(key, _)| key.as_str() != CREDENTIAL_TOKEN)
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();

        let state = if self.settings.auth.required_for(transport) {
            self.authenticate(ctx, session_id, credentials).await
        } else {
            AuthState::Unauthenticated.authorize("")
        };

        match &state {
            AuthState::Authorized { token } => {
                self.sessions.track(session_id, token, transport, metadata);
                self.metrics.record_session(transport);
                info!(session_id = %session_id, "Session connected");
                Ok(state)
            }
            AuthState::Rejected { reason } => {
                self.metrics.record_auth_rejection();
                warn!(session_id = %session_id, reason = %reason, "Connection rejected");
                Err(BridgeError::AuthenticationRejected(reason.clone()))
            }
            _ => Err(BridgeError::AuthenticationRejected(
                "authentication did not complete".to_string(),
            )),
        }
    }

    fn reserve_slot(&self, session_id: &str) -> Result<Admission<'_>, BridgeError> {
        let limit = self.settings.max_connections;
        let mut admitting = self.admitting.lock();
        if self.sessions.len() + *admitting >= limit {
            warn!(session_id = %session_id, limit, "Connection refused, session limit reached");
            return Err(SessionError::CapacityReached { limit }.into());
        }
        *admitting += 1;
        Ok(Admission {
            admitting: &self.admitting,
        })
    }

    async fn authenticate(
        &self,
        ctx: &CallContext,
        session_id: &str,
        credentials: BTreeMap<String, String>,
    ) -> AuthState {
        let state = AuthState::Unauthenticated.begin();
        let ctx = ctx.clone().with_timeout(self.settings.call_timeout);

        match self.dispatcher.authenticate(&ctx, session_id, credentials).await {
            Ok(verdict) if verdict.allowed => state.authorize(verdict.token),
            Ok(verdict) if verdict.message.is_empty() => state.reject("rejected by worker"),
            Ok(verdict) => state.reject(verdict.message),
            Err(e) => {
                warn!(session_id = %session_id, category = e.category(), "Authentication handshake failed: {}", e);
                state.reject(format!("authentication failed: {}", e.category()))
            }
        }
    }

    /// Admit a session and return a guard that disconnects it on drop.
    pub async fn connect(
        self: &Arc<Self>,
        ctx: &CallContext,
        session_id: &str,
        transport: TransportKind,
        credentials: BTreeMap<String, String>,
    ) -> Result<ConnectedSession, BridgeError> {
        let state = self
            .on_connect(ctx, session_id, transport, credentials)
            .await?;
        Ok(ConnectedSession {
            bridge: self.clone(),
            id: session_id.to_string(),
            state,
        })
    }

    /// Forget a session and its notification peer.
    pub fn on_disconnect(&self, session_id: &str) -> bool {
        self.peers.remove(session_id);
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Session disconnected");
        }
        removed
    }

    /// Register the peer of a session for tool list notifications.
    pub fn attach_peer(&self, session_id: &str, peer: Peer<RoleServer>) {
        if self.sessions.contains(session_id) {
            self.peers.insert(session_id.to_string(), peer);
        } else {
            debug!(session_id = %session_id, "Peer for an untracked session ignored");
        }
    }

    /// Drop sessions idle for longer than `max_idle`.
    pub fn expire_idle_sessions(&self, max_idle: Duration) -> Vec<String> {
        let expired = self.sessions.expire_idle(max_idle);
        for session_id in &expired {
            self.peers.remove(session_id);
            info!(session_id = %session_id, "Idle session expired");
        }
        expired
    }

    // ========================================================================
    // Tool calls
    // ========================================================================

    /// Invoke a declared tool on a worker.
    ///
    /// A worker result with `isError` is returned as `Ok`. A tool removed
    /// while the call is in flight still completes. Plain session ids are
    /// treated as bound to the caller's connection.
    pub async fn call_tool(
        &self,
        ctx: CallContext,
        caller: impl Into<Caller>,
        tool_name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, BridgeError> {
        let caller = caller.into();
        let session_id = caller.id();
        let route = self
            .tools
            .route(tool_name)
            .ok_or_else(|| ToolError::not_found(tool_name))?;

        let ctx = ctx.with_timeout(self.settings.call_timeout);
        let arguments = Value::Object(arguments.unwrap_or_default());

        let started = Instant::now();
        let result = self
            .dispatcher
            .call_tool(&ctx, &caller, route.name(), arguments, self.settings.render)
            .await;
        let elapsed = started.elapsed();

        match &result {
            Ok(output) if output.is_error == Some(true) => {
                debug!(session_id = %session_id, tool = %tool_name, "Tool reported an error");
                self.metrics.record_call(tool_name, OUTCOME_TOOL_ERROR, elapsed);
            }
            Ok(_) => {
                self.metrics.record_call(tool_name, OUTCOME_SUCCESS, elapsed);
            }
            Err(DispatchError::Cancelled) => {
                warn!(session_id = %session_id, tool = %tool_name, "Tool call cancelled");
                self.metrics.record_call(tool_name, "cancelled", elapsed);
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    tool = %tool_name,
                    category = e.category(),
                    "Tool call failed: {}", e
                );
                self.metrics.record_call(tool_name, e.category(), elapsed);
            }
        }

        result.map_err(BridgeError::from)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(
            &self.tools,
            &self.sessions,
            self.dispatcher.channel().status(),
        )
    }

    /// Drop every session and release the workers.
    pub async fn shutdown(&self) {
        self.peers.clear();
        self.sessions.clear();
        self.dispatcher.channel().shutdown().await;
        info!("Bridge shut down");
    }
}

/// Pick who a tool call is attributed to.
///
/// A connection bound to a session always uses that session; a `sessionId`
/// in the call metadata is ignored for it. An unbound connection may declare
/// an id through the metadata, which is passed on without a token. Otherwise
/// the call is [`UNKNOWN_SESSION`].
pub fn resolve_caller(meta_session: Option<&Value>, connection: Option<&str>) -> Caller {
    let declared = meta_session.and_then(declared_session_id);
    match (connection, declared) {
        (Some(bound), Some(declared)) if declared != bound => {
            debug!(session_id = %bound, declared = %declared, "Ignoring sessionId from call metadata");
            Caller::from(bound)
        }
        (Some(bound), _) => Caller::from(bound),
        (None, Some(declared)) => Caller::Anonymous(declared),
        (None, None) => Caller::Anonymous(UNKNOWN_SESSION.to_string()),
    }
}

/// Scalar metadata ids are used as text; empty strings, null and
/// structured values are ignored.
fn declared_session_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => {
            debug!("Ignoring structured sessionId in call metadata");
            None
        }
        _ => None,
    }
}

/// A connected session, disconnected when dropped.
pub struct ConnectedSession {
    bridge: Arc<ToolBridge>,
    id: String,
    state: AuthState,
}

impl ConnectedSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }
}

impl Drop for ConnectedSession {
    fn drop(&mut self) {
        self.bridge.on_disconnect(&self.id);
    }
}
