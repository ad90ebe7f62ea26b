//! In-process worker channel.
//!
//! Serves envelopes with an async handler inside this process. Useful for
//! embedding the bridge next to native Rust workers and as a test double.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::channel::WorkerChannel;
use super::context::CallContext;
use super::envelope::Envelope;
use super::error::WorkerError;

type Handler = dyn Fn(Envelope) -> BoxFuture<'static, Result<Bytes, WorkerError>> + Send + Sync;

/// A worker channel backed by an in-process handler.
pub struct LocalChannel {
    handler: Arc<Handler>,
    sent: AtomicUsize,
    history: Mutex<Vec<Envelope>>,
}

impl LocalChannel {
    /// Create a channel from an async handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Bytes, WorkerError>> + Send + 'static,
    {
        let handler: Arc<Handler> = Arc::new(
            move |envelope: Envelope| -> BoxFuture<'static, Result<Bytes, WorkerError>> {
                handler(envelope).boxed()
            },
        );

        Self {
            handler,
            sent: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Create a channel from a synchronous handler.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&Envelope) -> Result<Bytes, WorkerError> + Send + Sync + 'static,
    {
        Self::new(move |envelope| {
            let result = handler(&envelope);
            async move { result }
        })
    }

    /// A channel answering every envelope with the same JSON value.
    pub fn replying(value: serde_json::Value) -> Self {
        let body = Bytes::from(value.to_string());
        Self::from_fn(move |_| Ok(body.clone()))
    }

    /// A channel failing every envelope with the same error.
    pub fn failing(error: WorkerError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Number of envelopes handed to the handler.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Envelopes handed to the handler, oldest first.
    pub fn history(&self) -> Vec<Envelope> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl WorkerChannel for LocalChannel {
    async fn send(&self, ctx: &CallContext, envelope: Envelope) -> Result<Bytes, WorkerError> {
        ctx.check()?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.history.lock().push(envelope.clone());
        (self.handler)(envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::workers::EventKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_replying_channel() {
        let channel = LocalChannel::replying(json!({ "ok": true }));
        let envelope = Envelope::new("s1", EventKind::CallTool, Bytes::from_static(b"{}"));

        let body = channel.send(&CallContext::new(), envelope).await.unwrap();
        assert_eq!(body, Bytes::from(r#"{"ok":true}"#));
        assert_eq!(channel.sent(), 1);
        assert_eq!(channel.history()[0].session_id, "s1");
    }

    #[tokio::test]
    async fn test_cancelled_context_is_not_sent() {
        let channel = LocalChannel::replying(json!({}));
        let ctx = CallContext::new();
        ctx.cancel();

        let envelope = Envelope::new("s1", EventKind::CallTool, Bytes::new());
        assert_eq!(
            channel.send(&ctx, envelope).await,
            Err(WorkerError::Cancelled)
        );
        assert_eq!(channel.sent(), 0);
    }

    #[test]
    fn test_failing_channel() {
        let channel = LocalChannel::failing(WorkerError::unavailable("down"));
        let envelope = Envelope::new("s1", EventKind::ClientConnected, Bytes::new());

        let result = tokio_test::block_on(channel.send(&CallContext::new(), envelope));
        assert_eq!(result, Err(WorkerError::Unavailable("down".into())));
        assert_eq!(channel.sent(), 1);
    }
}
