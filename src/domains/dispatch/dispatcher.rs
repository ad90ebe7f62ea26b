//! Event dispatcher.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use rmcp::model::CallToolResult;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::error::DispatchError;
use super::events::{CallTool, ClientConnected, ClientConnectedResponse, Event};
use crate::domains::sessions::{Caller, SessionRegistry};
use crate::domains::tools::{RenderPolicy, render_result};
use crate::domains::workers::{CallContext, Envelope, WorkerChannel};

/// Sends typed events to workers and decodes their answers.
///
/// Holds no lock across a worker round trip; any number of dispatches may be
/// in flight at once.
#[derive(Clone)]
pub struct EventDispatcher {
    channel: Arc<dyn WorkerChannel>,
    sessions: Arc<SessionRegistry>,
}

impl EventDispatcher {
    pub fn new(channel: Arc<dyn WorkerChannel>, sessions: Arc<SessionRegistry>) -> Self {
        Self { channel, sessions }
    }

    /// The underlying worker channel.
    pub fn channel(&self) -> &Arc<dyn WorkerChannel> {
        &self.channel
    }

    /// Dispatch one event and decode the typed response.
    ///
    /// The envelope always carries the event kind, session id and content
    /// type headers. The session token is added only for a bound caller
    /// with a stored token. An already finished `ctx` fails without
    /// contacting the channel.
    #[instrument(skip_all, fields(session_id = %caller, event = %E::KIND))]
    pub async fn dispatch<E: Event>(
        &self,
        ctx: &CallContext,
        caller: &Caller,
        payload: &E,
    ) -> Result<E::Response, DispatchError> {
        let body = serde_json::to_vec(payload).map_err(DispatchError::EncodingFailed)?;
        let session_id = caller.id();

        let mut envelope = Envelope::new(session_id, E::KIND, Bytes::from(body));
        if let Some(token) = self.bound_token(caller) {
            envelope = envelope.with_token(&token);
        }

        let response = ctx.run(self.channel.send(ctx, envelope)).await?;

        serde_json::from_slice::<E::Response>(&response).map_err(|e| {
            warn!(
                session_id = %session_id,
                event = %E::KIND,
                kind = ?e.classify(),
                line = e.line(),
                column = e.column(),
                "Worker response does not decode"
            );
            DispatchError::InvalidWorkerResponse(format!(
                "{:?} error at line {} column {}",
                e.classify(),
                e.line(),
                e.column()
            ))
        })
    }

    fn bound_token(&self, caller: &Caller) -> Option<String> {
        match caller {
            Caller::Session(id) => self.sessions.token(id),
            Caller::Anonymous(_) => None,
        }
    }

    /// Ask a worker whether a connecting client is allowed.
    pub async fn authenticate(
        &self,
        ctx: &CallContext,
        session_id: &str,
        credentials: BTreeMap<String, String>,
    ) -> Result<ClientConnectedResponse, DispatchError> {
        let payload = ClientConnected {
            session_id: session_id.to_string(),
            credentials,
        };
        self.dispatch(ctx, &Caller::from(session_id), &payload).await
    }

    /// Invoke a tool on a worker and render its result.
    ///
    /// Marks activity of a bound caller's session first, whatever the
    /// outcome. A worker result with `isError` is returned as `Ok`.
    pub async fn call_tool(
        &self,
        ctx: &CallContext,
        caller: &Caller,
        tool_name: &str,
        arguments: Value,
        policy: RenderPolicy,
    ) -> Result<CallToolResult, DispatchError> {
        if let Caller::Session(id) = caller {
            if !self.sessions.touch(id) {
                debug!(session_id = %id, "Tool call for an untracked session");
            }
        }

        let payload = CallTool {
            session_id: caller.id().to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        };
        let response = self.dispatch(ctx, caller, &payload).await?;

        Ok(render_result(&response.content, response.is_error, policy))
    }
}
