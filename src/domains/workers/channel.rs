//! The worker channel abstraction.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::context::CallContext;
use super::envelope::Envelope;
use super::error::WorkerError;

/// Occupancy of a worker pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Live workers.
    pub total: usize,

    /// Workers currently serving a request.
    pub busy: usize,

    /// Live workers waiting for a request.
    pub idle: usize,
}

/// One correlated request/response exchange with exactly one worker.
///
/// Implementations return either the raw response body or a [`WorkerError`]
/// for transport and infrastructure problems. They never retry.
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    /// Send an envelope and wait for its response.
    ///
    /// `ctx` bounds any waiting the channel does on its own (for example for
    /// a free worker); callers additionally race the whole call against it.
    async fn send(&self, ctx: &CallContext, envelope: Envelope) -> Result<Bytes, WorkerError>;

    /// Current pool occupancy, if the channel is backed by a pool.
    fn status(&self) -> Option<PoolStatus> {
        None
    }

    /// Release all workers.
    async fn shutdown(&self) {}
}
