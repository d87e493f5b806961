//! Bounded retry with exponential backoff for ledger calls.
//!
//! Every attempt runs under a deadline. Reads retry on any transient error;
//! writes retry only when the ledger provably never received the first
//! submission, so a payment is never sent twice.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{LedgerConfig, RetryConfig};
use crate::error::{LedgerError, LedgerResult};

/// Retry policy with exponential backoff and a per-attempt deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    max_attempts: u32,
    /// Base delay between retries
    base_delay: Duration,
    /// Maximum delay between retries
    max_delay: Duration,
    /// Deadline for each attempt
    call_timeout: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            call_timeout,
        }
    }

    /// Create from retry config and a per-call deadline.
    pub fn from_config(config: &RetryConfig, call_timeout: Duration) -> Self {
        Self::new(
            config.max_attempts,
            config.base_delay,
            config.max_delay,
            call_timeout,
        )
    }

    /// Create from a full ledger config.
    pub fn from_ledger_config(config: &LedgerConfig) -> Self {
        Self::from_config(&config.retry, config.call_timeout)
    }

    /// A policy that tries once with the given deadline.
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, call_timeout)
    }

    /// Maximum attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculate the delay for a given attempt (0-indexed).
    ///
    /// Uses exponential backoff with +-25% jitter to prevent thundering herd.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // Exponential backoff: base_delay * 2^(attempt-1)
        let multiplier = 2u32.saturating_pow(attempt - 1);
        let base = self.base_delay.saturating_mul(multiplier);

        let capped = std::cmp::min(base, self.max_delay);

        let jitter_range = capped.as_millis() as u64 / 4;
        if jitter_range == 0 {
            return capped;
        }
        let jitter = rand::random::<u64>() % (jitter_range * 2);
        let jittered_ms = (capped.as_millis() as u64)
            .saturating_sub(jitter_range)
            .saturating_add(jitter);
        Duration::from_millis(jittered_ms)
    }

    /// Execute a read, retrying on network errors and timeouts.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        self.run(operation, LedgerError::is_retryable).await
    }

    /// Execute a write, retrying only on errors raised before submission.
    pub async fn execute_submit<F, Fut, T>(&self, operation: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        self.run(operation, LedgerError::is_safe_to_resubmit).await
    }

    async fn run<F, Fut, T>(
        &self,
        mut operation: F,
        should_retry: fn(&LedgerError) -> bool,
    ) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            let delay = self.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, ?delay, "Retrying after delay");
                sleep(delay).await;
            }

            let result = match timeout(self.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::timeout(format!(
                    "no response within {:?}",
                    self.call_timeout
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if should_retry(&e) && attempt + 1 < self.max_attempts {
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            error = %e,
                            "Transient ledger error, will retry"
                        );
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LedgerError::timeout("max retries exceeded")))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), Duration::from_secs(30))
    }
}
