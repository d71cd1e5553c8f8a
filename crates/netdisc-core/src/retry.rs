//! Bounded retry of transient transport failures.

use crate::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Retry policy for one device command.
///
/// Transient failures are retried with exponential backoff up to
/// `max_attempts` total attempts; permanent failures return at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(5000),
        }
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, TransportError>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// No further attempt is started once `cancel` is tripped; the last
    /// failure is returned instead.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = op().await;

            let err = match result {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(err) => err,
            };

            if !err.is_transient() || attempts >= max_attempts || cancel.is_cancelled() {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.delay_for(attempts);
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %err, "Retrying transient failure");

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Attempted {
                        result: Err(err),
                        attempts,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
