//! Retry-with-backoff combinator for external calls.
//!
//! The chunking and ranking engines never retry (they perform no I/O);
//! retry belongs to the orchestration around embedding and index calls.
//! Backoff doubles per attempt from `base_delay`, capped at 32x, matching
//! the 1s/2s/4s/… schedule used for HTTP providers.

use std::future::Future;
use std::time::Duration;

/// How many times and how fast to retry a fallible operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based; attempt 1 has no delay).
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 2).min(5))
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping with exponential
/// backoff between attempts. Only errors for which `retryable` returns true
/// are retried; others propagate immediately.
pub async fn with_backoff<T, E, F, Fut, R>(
    policy: RetryPolicy,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay_before(attempt)).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !retryable(&e) || attempt == attempts {
                    return Err(e);
                }
                last_err = Some(e);
            }
        }
    }

    // Unreachable: the loop always returns on the final attempt.
    Err(last_err.expect("retry loop exited without result"))
}
