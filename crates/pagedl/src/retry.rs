//! Bounded fixed-delay retry envelope for page attempts.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PageError;

/// Configuration for the page retry envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed pause between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_ms: 3000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent.
///
/// The closure receives the 0-based attempt number. Non-retryable errors are
/// returned unchanged; a retryable error on the last attempt is escalated to
/// [`PageError::Fatal`].
pub async fn retry_fixed<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T, PageError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, PageError>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(PageError::exhausted(attempt + 1, err));
                }
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_attempts(),
                    delay_ms = policy.delay_ms,
                    error = %err,
                    "Page attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay()).await;
                attempt += 1;
            }
        }
    }
}
