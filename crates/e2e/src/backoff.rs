//! Exponential backoff for single in-process operations
//!
//! This wraps one fallible async operation (a browser action, a health
//! probe). It is separate from the scenario-level [`crate::retry`]
//! orchestrator, which re-runs whole scenarios with a flat delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Markers of failures that usually pass on a second try
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "net::err_",
    "econnreset",
    "econnrefused",
    "socket hang up",
    "navigation failed",
    "navigation interrupted",
    "target closed",
    "page closed",
    "browser has been closed",
    "element is not attached",
    "detached from the dom",
    "stale element",
    "element is not visible",
    "element is outside of the viewport",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
];

/// Whether an error message looks like a transient (flaky) failure
pub fn should_retry_test(error_text: &str) -> bool {
    let lowered = error_text.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Run `op` up to `max_attempts` times, sleeping with exponential backoff
/// between attempts. Returns the last error when every attempt fails.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_when(max_attempts, base_delay, |_: &E| true, op).await
}

/// Like [`retry_with_backoff`], but gives up immediately when
/// `should_retry` rejects an error.
pub async fn retry_with_backoff_when<T, E, F, Fut, P>(
    max_attempts: u32,
    base_delay: Duration,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    "Attempt {}/{} failed: {} (retrying in {:?})",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Backoff retry that only retries errors [`should_retry_test`] deems transient
pub async fn retry_transient<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_when(
        max_attempts,
        base_delay,
        |e: &E| should_retry_test(&e.to_string()),
        op,
    )
    .await
}
