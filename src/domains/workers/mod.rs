//! Workers domain module.
//!
//! Workers are out-of-process executors reachable only through one
//! request/response exchange per call. This module defines that exchange:
//!
//! - `envelope.rs` - The request unit and its routing headers
//! - `context.rs` - Cancellation and deadline of one call
//! - `channel.rs` - The `WorkerChannel` trait
//! - `process.rs` - A pool of child processes speaking line-delimited JSON
//! - `local.rs` - An in-process channel for embedding and tests

mod channel;
mod context;
mod envelope;
mod error;
mod local;
mod process;

pub use channel::{PoolStatus, WorkerChannel};
pub use context::CallContext;
pub use envelope::{
    CONTENT_TYPE_JSON, Envelope, EventKind, HEADER_CLIENT_TOKEN, HEADER_CONTENT_TYPE,
    HEADER_EVENT, HEADER_SESSION_ID,
};
pub use error::WorkerError;
pub use local::LocalChannel;
pub use process::{ProcessPool, ProcessPoolConfig};
