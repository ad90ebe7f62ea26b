//! Sessions domain module.
//!
//! A session is the in-memory correlation handle for one client connection,
//! from authentication to disconnect. Nothing here survives a restart.

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{AuthPolicy, AuthState};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{Caller, Session, TransportKind};
