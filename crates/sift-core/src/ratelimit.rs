//! Token-bucket rate limiter for provider calls
//!
//! The bucket starts full with `capacity` tokens (requests per minute) and a
//! background task adds one token every `60s / capacity`. Callers either
//! poll with [`RateLimiter::try_acquire`] or block in [`RateLimiter::wait`].
//!
//! The refill task is owned by the limiter and stopped exactly once by
//! [`RateLimiter::close`] (or on drop). A closed limiter never hands out
//! tokens again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{Error, Result};

/// Requests per minute used when the configured rate is zero
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// How often `wait` retries `try_acquire`
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    capacity: u32,
}

impl Bucket {
    fn refill_one(&mut self) {
        if self.tokens < self.capacity {
            self.tokens += 1;
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    refill_interval: Duration,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Create a limiter admitting `requests_per_minute` calls per minute.
    ///
    /// Must be called within a Tokio runtime (the refill task is spawned).
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = if requests_per_minute == 0 {
            DEFAULT_REQUESTS_PER_MINUTE
        } else {
            requests_per_minute
        };
        let refill_interval = Duration::from_secs(60) / capacity;
        Self::with_refill_interval(capacity, refill_interval)
    }

    /// Create a limiter with an explicit capacity and refill interval
    pub fn with_refill_interval(capacity: u32, refill_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        let bucket = Arc::new(Mutex::new(Bucket {
            tokens: capacity,
            capacity,
        }));
        let shutdown = CancellationToken::new();

        tokio::spawn(refill_loop(
            bucket.clone(),
            refill_interval,
            shutdown.clone(),
        ));

        Self {
            bucket,
            refill_interval,
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // A panic while holding the lock cannot leave the counter outside
        // [0, capacity], so a poisoned bucket is still usable.
        self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a token if one is available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let mut bucket = self.lock();
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Block until a token is available or the context is done
    pub async fn wait(&self, ctx: &RequestContext) -> Result<()> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(Error::Closed("rate limiter"));
            }
            if self.try_acquire() {
                return Ok(());
            }
            if let Err(err) = ctx.sleep(WAIT_POLL_INTERVAL).await {
                debug!("Rate limiter wait abandoned: {}", err);
                return Err(wrap_cancel(err));
            }
        }
    }

    /// Restore full capacity immediately
    pub fn reset(&self) {
        let mut bucket = self.lock();
        bucket.tokens = bucket.capacity;
    }

    /// Tokens currently available
    pub fn available(&self) -> u32 {
        self.lock().tokens
    }

    pub fn capacity(&self) -> u32 {
        self.lock().capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Stop the refill task. Safe to call more than once.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        debug!("Rate limiter closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.close();
    }
}

fn wrap_cancel(err: Error) -> Error {
    match err {
        Error::Cancelled(reason) => Error::Cancelled(format!("rate limiter wait: {}", reason)),
        other => other,
    }
}

async fn refill_loop(bucket: Arc<Mutex<Bucket>>, period: Duration, shutdown: CancellationToken) {
    // First tick one full period from now; the bucket starts full.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let mut guard = bucket.lock().unwrap_or_else(|p| p.into_inner());
                guard.refill_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_bound_and_single_refill() {
        let limiter = RateLimiter::new(60);
        assert_eq!(limiter.refill_interval(), Duration::from_secs(1));

        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::with_refill_interval(3, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(limiter.available(), 3);
    }

    #[tokio::test]
    async fn test_zero_rate_uses_default() {
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.capacity(), DEFAULT_REQUESTS_PER_MINUTE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_until_refill() {
        let limiter = RateLimiter::with_refill_interval(1, Duration::from_millis(500));
        assert!(limiter.try_acquire());

        let start = Instant::now();
        limiter.wait(&RequestContext::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_honors_cancellation() {
        let limiter = RateLimiter::with_refill_interval(1, Duration::from_secs(3600));
        assert!(limiter.try_acquire());

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(250));
        let err = limiter.wait(&ctx).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[tokio::test]
    async fn test_reset_restores_capacity() {
        let limiter = RateLimiter::new(5);
        while limiter.try_acquire() {}
        assert_eq!(limiter.available(), 0);
        limiter.reset();
        assert_eq!(limiter.available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_final() {
        let limiter = RateLimiter::new(10);
        limiter.close();
        limiter.close();
        assert!(limiter.is_closed());
        assert!(!limiter.try_acquire());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!limiter.try_acquire());
        assert!(matches!(
            limiter.wait(&RequestContext::new()).await,
            Err(Error::Closed(_))
        ));
    }
}
