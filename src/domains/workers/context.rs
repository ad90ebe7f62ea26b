//! Per-call cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::WorkerError;

/// Cancellation scope of one request to a worker.
///
/// Cloning shares the cancellation token; the deadline is copied.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context with no deadline and a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled together with `token`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Bound the context by `timeout` from now, keeping an earlier deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Bound the context by `deadline`, keeping an earlier one.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail if the context is already done.
    pub fn check(&self) -> Result<(), WorkerError> {
        if self.cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(WorkerError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` until it completes or the context is done.
    ///
    /// When the context ends first, `fut` is dropped and the matching error
    /// is returned.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, WorkerError>
    where
        F: Future<Output = Result<T, WorkerError>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WorkerError::Cancelled),
            _ = deadline => Err(WorkerError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_is_live() {
        assert!(CallContext::new().check().is_ok());
    }

    #[test]
    fn test_cancelled_context() {
        let ctx = CallContext::new();
        ctx.cancel();
        assert_eq!(ctx.check(), Err(WorkerError::Cancelled));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = CallContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
        let result = ctx.run(async { Ok::<_, WorkerError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_run_deadline_exceeded() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, WorkerError>(())
            })
            .await;
        assert_eq!(result, Err(WorkerError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_run_cancelled_mid_flight() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, WorkerError>(())
            })
            .await;
        assert_eq!(result, Err(WorkerError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_does_not_poll_when_already_cancelled() {
        let ctx = CallContext::new();
        ctx.cancel();

        let mut polled = false;
        let result = ctx
            .run(async {
                polled = true;
                Ok::<_, WorkerError>(())
            })
            .await;
        assert_eq!(result, Err(WorkerError::Cancelled));
        assert!(!polled);
    }
}
