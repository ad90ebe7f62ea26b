//! Session state for one client connection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a client is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// A network stream (TCP or HTTP).
    Stream,

    /// A local pipe (stdin/stdout).
    Pipe,
}

impl TransportKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Pipe => "pipe",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a tool call is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// The session bound to the calling connection.
    Session(String),

    /// An id the client declared for itself. No token is attached for it
    /// and no session is touched.
    Anonymous(String),
}

impl Caller {
    /// The session id sent to workers.
    pub fn id(&self) -> &str {
        match self {
            Self::Session(id) | Self::Anonymous(id) => id,
        }
    }

    /// Whether the id belongs to the calling connection.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl From<&str> for Caller {
    fn from(id: &str) -> Self {
        Self::Session(id.to_string())
    }
}

impl From<String> for Caller {
    fn from(id: String) -> Self {
        Self::Session(id)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// An active client session.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque session identifier.
    pub id: String,

    /// Token returned by the worker at authentication, possibly empty.
    #[serde(skip_serializing)]
    pub auth_token: String,

    /// Transport the session arrived on.
    pub transport: TransportKind,

    /// When the session was established.
    pub connected_at: DateTime<Utc>,

    /// Last tool invocation attributed to the session.
    pub last_activity: DateTime<Utc>,

    /// Transport supplied metadata (peer address, user agent, ...).
    pub metadata: Map<String, Value>,
}

impl Session {
    /// Create a session connected now.
    pub fn new(
        id: impl Into<String>,
        auth_token: impl Into<String>,
        transport: TransportKind,
        metadata: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            auth_token: auth_token.into(),
            transport,
            connected_at: now,
            last_activity: now,
            metadata,
        }
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }
}

/// Custom Debug implementation to redact the token from logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field(
                "auth_token",
                &(!self.auth_token.is_empty()).then_some("[REDACTED]"),
            )
            .field("transport", &self.transport)
            .field("connected_at", &self.connected_at)
            .field("last_activity", &self.last_activity)
            .field("metadata", &self.metadata)
            .finish()
    }
}
