//! Bounded retry with a fixed delay between attempts.
//!
//! Every engine download call (single item, whole collection, each selected
//! member) goes through [`RetryPolicy::run`]. Each attempt re-runs the whole
//! operation; nothing is resumed by this layer.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::config::RetrySettings;

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Failure after the last allowed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// Attempts made (equals the policy's `max_attempts`).
    pub attempts: u32,
    /// Error of the final attempt.
    pub last_error: E,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.attempts, settings.delay())
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. `on_retry` is called with
    /// the upcoming attempt number and the failure that caused it, before
    /// the delay.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn run<T, E, F, Fut, R>(
        &self,
        mut op: F,
        mut on_retry: R,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(u32, &E),
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    debug!(attempt, "attempt succeeded");
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(attempt, error = %e, "giving up");
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, delay = ?self.delay, "attempt failed, retrying");
                    on_retry(attempt + 1, &e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
