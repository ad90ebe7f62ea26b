//! Dispatch domain module.
//!
//! Turns typed events into envelopes, sends them over a worker channel and
//! decodes the typed answer.

mod dispatcher;
mod error;
mod events;

pub use dispatcher::EventDispatcher;
pub use error::DispatchError;
pub use events::{CallTool, CallToolResponse, ClientConnected, ClientConnectedResponse, Event};
