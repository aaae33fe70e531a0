//! Bounded exponential backoff, shared by the Archiver's retry-on-write-
//! failure policy (spec §4.6) and any stage that wraps an external call in
//! a retry loop. Same shape as the reconnect backoff used elsewhere in
//! this kind of system, generalised to any fallible async operation.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Minimum delay between attempts.
const BACKOFF_BASE_MS: u64 = 200;
/// Maximum delay between attempts.
const BACKOFF_MAX_MS: u64 = 5_000;
/// Jitter fraction applied to each delay (±10%).
const JITTER_FRACTION: f64 = 0.10;

/// Retry `op` up to `max_attempts` times with exponential backoff and
/// jitter. Returns the first `Ok`, or the last `Err` once attempts are
/// exhausted. `max_attempts = 1` means "try once, no retry."
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    max_attempts: u32,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay_ms = BACKOFF_BASE_MS;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == max_attempts => return Err(e),
            Err(e) => {
                let jitter = jitter_ms(delay_ms);
                let total = delay_ms + jitter;
                warn!(
                    op = label,
                    attempt,
                    max_attempts,
                    error = %e,
                    retry_after_ms = total,
                    "operation failed, retrying with backoff"
                );
                sleep(Duration::from_millis(total)).await;
                delay_ms = (delay_ms * 2).min(BACKOFF_MAX_MS);
            }
        }
    }

    unreachable!("retry loop exited without returning")
}

/// Deterministic pseudo-random jitter derived from the current monotonic
/// clock — avoids pulling in a `rand` dependency for a cosmetic spread.
fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try_without_sleeping() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff("t", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff("t", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff("t", 2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always fails".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "always fails");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
