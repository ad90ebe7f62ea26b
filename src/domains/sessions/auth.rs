//! Authentication state machine for new sessions.
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authorized | Rejected
//! Unauthenticated ----------------------> Authorized   (auth disabled or exempt)
//! ```
//!
//! The worker handshake itself is driven by the bridge; this module only owns
//! the states, the legal transitions and the per-transport policy.

use serde::{Deserialize, Serialize};

use super::session::TransportKind;

/// Authentication state of a connecting session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing has happened yet.
    Unauthenticated,

    /// The credentials were sent to a worker, waiting for the answer.
    Authenticating,

    /// The session may be tracked and may call tools.
    Authorized { token: String },

    /// The connection must be refused.
    Rejected { reason: String },
}

impl AuthState {
    /// Start the worker handshake.
    pub fn begin(self) -> Self {
        match self {
            Self::Unauthenticated => Self::Authenticating,
            other => other,
        }
    }

    /// Authorize the session with the given token.
    ///
    /// A rejected session stays rejected.
    pub fn authorize(self, token: impl Into<String>) -> Self {
        match self {
            Self::Unauthenticated | Self::Authenticating => Self::Authorized {
                token: token.into(),
            },
            other => other,
        }
    }

    /// Reject the session.
    ///
    /// An authorized session stays authorized.
    pub fn reject(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Unauthenticated | Self::Authenticating => Self::Rejected {
                reason: reason.into(),
            },
            other => other,
        }
    }

    /// Whether the session was authorized.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }

    /// The session token, if authorized.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Authorized { token } => Some(token),
            _ => None,
        }
    }
}

/// Static authentication policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    /// Whether sessions must be authorized by a worker.
    pub enabled: bool,

    /// Whether local pipe sessions are trusted without a handshake.
    pub skip_for_stdio: bool,
}

impl AuthPolicy {
    /// Whether a session on `transport` needs the worker handshake.
    pub fn required_for(&self, transport: TransportKind) -> bool {
        match transport {
            TransportKind::Pipe => self.enabled && !self.skip_for_stdio,
            TransportKind::Stream => self.enabled,
        }
    }
}
