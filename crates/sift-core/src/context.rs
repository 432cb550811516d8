//! Request context: cancellation signal plus optional deadline
//!
//! Every suspension point in the core (rate-limit wait, retry backoff,
//! provider call) takes a `RequestContext` so a caller can abort the whole
//! chain at once. Deadlines use `tokio::time::Instant`, which keeps them
//! consistent with the paused clock in tests.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Reason reported when the context's token was cancelled
pub const CONTEXT_CANCELED: &str = "context canceled";

/// Reason reported when the context's deadline passed
pub const DEADLINE_EXCEEDED: &str = "context deadline exceeded";

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled unless `cancel` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Child context with a deadline `timeout` from now
    ///
    /// The child never outlives the parent: an earlier parent deadline wins,
    /// and cancelling the parent cancels the child.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context with an absolute deadline
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Child context sharing the parent's deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The cancellation error if the context is already done
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled(CONTEXT_CANCELED.into()));
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Error::Cancelled(DEADLINE_EXCEEDED.into())),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Error::Cancelled(CONTEXT_CANCELED.into()),
                _ = tokio::time::sleep_until(deadline) => Error::Cancelled(DEADLINE_EXCEEDED.into()),
            },
            None => {
                self.token.cancelled().await;
                Error::Cancelled(CONTEXT_CANCELED.into())
            }
        }
    }

    /// Sleep for `duration`, returning early with the cancellation error
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            err = self.done() => Err(err),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Run `fut` bounded by this context and a default timeout.
    ///
    /// The context deadline applies when present; otherwise `default_timeout`
    /// caps the call. Cancellation drops `fut` mid-flight.
    pub async fn run<T, F>(&self, default_timeout: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        let remaining = self.remaining();
        let limit = remaining.unwrap_or(default_timeout);
        tokio::select! {
            err = self.done() => Err(err),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(inner) => inner,
                // The context's own deadline reads the same as `done()` would
                Err(_) if remaining.is_some() => Err(Error::Cancelled(DEADLINE_EXCEEDED.into())),
                Err(_) => Err(Error::Timeout(limit)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_observed() {
        let ctx = RequestContext::new();
        assert!(ctx.err().is_none());
        ctx.cancel();
        let err = ctx.err().unwrap();
        assert_eq!(err.to_string(), "cancelled: context canceled");
        assert!(ctx.done().await.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let parent = RequestContext::new();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(child.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx.done().await;
        assert_eq!(err.to_string(), "cancelled: context deadline exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline() {
        let parent = RequestContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_default_timeout() {
        let ctx = RequestContext::new();
        let result: Result<()> = ctx
            .run(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_refuses_done_context() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let result = ctx.run(Duration::from_secs(1), async { Ok(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
