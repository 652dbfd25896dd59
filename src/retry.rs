//! Explicit retry policy for remote calls.
//!
//! Every CRM and assistant call goes through [`retry`] with a
//! [`RetryPolicy`] — attempt, and on a retryable failure sleep
//! `base_delay * backoff_factor^(attempt-1)` before the next attempt,
//! up to `max_attempts`, then propagate the final error.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::{AssistantError, CrmError};

/// Backoff configuration for a retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * self.backoff_factor.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Errors that can advertise whether another attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for CrmError {
    fn is_retryable(&self) -> bool {
        CrmError::is_retryable(self)
    }
}

impl Retryable for AssistantError {
    fn is_retryable(&self) -> bool {
        AssistantError::is_retryable(self)
    }
}

/// Run `op`, retrying retryable failures with exponential backoff.
///
/// Non-retryable errors and the final failed attempt propagate
/// immediately — no sleep follows the last failure.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "Retryable failure: {err}; next attempt in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
