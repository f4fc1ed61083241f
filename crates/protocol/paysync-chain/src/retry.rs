//! Exponential backoff with jitter.
//!
//! Used per RPC request by [`NeoRpcSource`](crate::NeoRpcSource) and per
//! failed iteration by the ingestion loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::ChainResult;

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    max_attempts: u32,
    /// Delay before the first retry
    base_delay: Duration,
    /// Cap on any single delay
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Create from retry config.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay, config.max_delay)
    }

    /// Maximum attempts per [`execute`](Self::execute) call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt` (0-indexed; attempt 0 never waits).
    ///
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`, with +-25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let capped_ms = capped.as_millis() as u64;
        let jitter_range = capped_ms / 4;
        if jitter_range == 0 {
            return capped;
        }
        let jitter = rand::random::<u64>() % (jitter_range * 2 + 1);
        Duration::from_millis(capped_ms - jitter_range + jitter)
    }

    /// Execute an async operation, retrying retryable errors.
    ///
    /// Non-retryable errors and the final attempt's error are returned as-is.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> ChainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChainResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let delay = self.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, ?delay, "Retrying after delay");
                sleep(delay).await;
            }

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Retryable chain error, will retry"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
