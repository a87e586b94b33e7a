//! Bounded fixed-interval retry
//!
//! The device recovers on a bounded timescale (wireless reassociation), so a
//! constant interval is used rather than exponential backoff. The wrapper is
//! generic over the operation and never knows which command it is retrying.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;

/// Default number of attempts per command
pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;

/// Default wait between attempts
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.interval_secs))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    /// Attempts that will actually be made
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Time spent waiting between attempts when every attempt fails
    pub fn total_wait(&self) -> Duration {
        self.interval * (self.attempts() - 1)
    }
}

/// Terminal failure of a retried operation
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or the policy's attempts are used up
///
/// The operation receives the 1-based attempt number. A success returns
/// immediately; after a failure the wrapper sleeps exactly `interval` unless
/// that was the last attempt.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "with_retry: succeeded after retrying");
                } else {
                    debug!("with_retry: succeeded on first attempt");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(attempt, error = %e, "with_retry: attempts exhausted");
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts,
                    error = %e,
                    interval = ?policy.interval,
                    "with_retry: attempt failed, retrying"
                );
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
        }
    }
}
