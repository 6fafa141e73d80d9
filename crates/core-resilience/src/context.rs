//! Per-call context carrying a deadline and a cancellation token
//!
//! Every blocking point in this crate (waiting for a pool slot, sleeping
//! between retries) races against [`CallContext::done`], so a caller's
//! deadline or cancellation is always observed promptly.

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped admitting work
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The cancellation token fired
    #[error("context cancelled")]
    Cancelled,

    /// The deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline and cancellation scope for one logical call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl CallContext {
    /// A context with no deadline and a fresh cancellation token
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline to `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replace the cancellation token with a caller-owned one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Cancel this context and every clone sharing its token
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Non-blocking check, cancellation wins over an expired deadline
    pub fn check(&self) -> Result<(), ContextError> {
        if self.cancellation.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.cancellation.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Sleep for `duration` unless the context finishes first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_is_live() {
        let ctx = CallContext::new();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_done_waits_for_cancel() {
        let ctx = CallContext::new();
        let mut done = tokio_test::task::spawn(ctx.done());
        tokio_test::assert_pending!(done.poll());

        ctx.cancel();
        assert!(done.is_woken());
        tokio_test::assert_ready_eq!(done.poll(), ContextError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        assert!(ctx.check().is_ok());

        let start = Instant::now();
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert_eq!(start.elapsed(), Duration::from_millis(50));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_is_shared_between_clones() {
        let ctx = CallContext::new();
        let clone = ctx.clone();
        clone.cancel();

        assert_eq!(ctx.check(), Err(ContextError::Cancelled));
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));
        let result = ctx.sleep(Duration::from_secs(5)).await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_before_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
        assert!(ctx.sleep(Duration::from_millis(10)).await.is_ok());
    }
}
