//! Domains module containing the bridge core organized by bounded contexts.
//!
//! - **tools**: declared tool definitions, routing table and content model
//! - **sessions**: client sessions and the authentication state machine
//! - **workers**: envelopes and the channel to out-of-process workers
//! - **dispatch**: typed events sent over the worker channel

pub mod dispatch;
pub mod sessions;
pub mod tools;
pub mod workers;
