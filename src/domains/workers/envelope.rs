//! Envelopes exchanged with workers.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Header carrying the event kind.
pub const HEADER_EVENT: &str = "X-MCP-Event";

/// Header carrying the session identifier.
pub const HEADER_SESSION_ID: &str = "X-Session-ID";

/// Header carrying the body content type.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Header carrying the session token, present only when the session has one.
pub const HEADER_CLIENT_TOKEN: &str = "X-Client-Token";

/// Content type of every envelope body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Event kinds understood by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A client is connecting and must be authorized.
    ClientConnected,

    /// A client invoked a tool.
    CallTool,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientConnected => "ClientConnected",
            Self::CallTool => "CallTool",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to a worker: routing headers plus an opaque JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub session_id: String,
    pub event: EventKind,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Envelope {
    /// Create an envelope with the event, session and content type headers set.
    pub fn new(session_id: impl Into<String>, event: EventKind, body: impl Into<Bytes>) -> Self {
        let session_id = session_id.into();
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_EVENT.to_string(), event.as_str().to_string());
        headers.insert(HEADER_SESSION_ID.to_string(), session_id.clone());
        headers.insert(HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());

        Self {
            session_id,
            event,
            headers,
            body: body.into(),
        }
    }

    /// Attach the session token. Empty tokens are not attached.
    pub fn with_token(mut self, token: &str) -> Self {
        if !token.is_empty() {
            self.headers
                .insert(HEADER_CLIENT_TOKEN.to_string(), token.to_string());
        }
        self
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
