use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::util::env::{env_flag, env_parse};

/// Pacing for a bounded sequential retry of one remote operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; total invocations = retries + 1.
    pub retries: u32,
    /// Delay between attempts.
    pub delay: Duration,
    /// Double the delay after each failed attempt.
    pub backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_secs(1),
            backoff: false,
        }
    }
}

impl RetryPolicy {
    /// Env-tunable pacing: MIGRATE_RETRIES / MIGRATE_RETRY_DELAY_MS /
    /// MIGRATE_RETRY_BACKOFF.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retries: env_parse("MIGRATE_RETRIES", defaults.retries),
            delay: Duration::from_millis(env_parse(
                "MIGRATE_RETRY_DELAY_MS",
                defaults.delay.as_millis() as u64,
            )),
            backoff: env_flag("MIGRATE_RETRY_BACKOFF", defaults.backoff),
        }
    }
}

/// Raised when a retried operation exhausts its attempts. The last underlying
/// failure stays reachable through `source()` so callers can still classify it.
#[derive(Debug, Error)]
#[error("{op} failed after {attempts} attempts")]
pub struct RetryError<E> {
    pub op: &'static str,
    pub attempts: u32,
    #[source]
    pub last: E,
}

/// Invoke `f` until it succeeds or the policy's attempts run out, sleeping
/// between attempts. Strictly sequential; one in-flight call at a time.
pub async fn with_retry<T, E, F, Fut>(
    op: &'static str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut delay = policy.delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt <= policy.retries => {
                warn!(op, attempt, error = %e, "attempt failed; will retry");
                tokio::time::sleep(delay).await;
                if policy.backoff {
                    delay = delay.saturating_mul(2);
                }
            }
            Err(e) => {
                return Err(RetryError {
                    op,
                    attempts: attempt,
                    last: e,
                })
            }
        }
    }
}
