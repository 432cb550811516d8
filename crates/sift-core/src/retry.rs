//! Exponential backoff for provider calls
//!
//! [`retry`] runs an operation up to `max_attempts` times. The operation
//! opts in to another attempt by wrapping its error with
//! [`Error::retryable`]; anything else is returned immediately. The wait
//! between attempts starts at `initial_delay`, grows by `multiplier`, and is
//! capped at `max_delay`.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{Error, Result};

/// Retry configuration, immutable per classifier
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Total attempts including the first
    pub max_attempts: u32,
    #[serde(with = "millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryOptions {
    /// Delay after the given failed attempt (1-indexed)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let raw_ms = self.initial_delay.as_millis() as f64 * multiplier.powi(exp);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.round().max(0.0) as u64)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Run `op` with exponential backoff.
///
/// Cancellation during the backoff sleep returns the cancellation error.
/// When attempts are exhausted, the last error is returned without its
/// retry marker.
pub async fn retry<T, F, Fut>(ctx: &RequestContext, options: &RetryOptions, mut op: F) -> Result<T>
where
    F: FnMut(RequestContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(ctx.clone()).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                warn!(attempts = attempt, error = %err, "Retry attempts exhausted");
                return Err(err.into_inner());
            }
            Err(err) => {
                let delay = options.delay_after(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    transient = err.is_transient(),
                    error = %err,
                    "Retrying after failure"
                );
                ctx.sleep(delay).await?;
            }
        }
    }
}
