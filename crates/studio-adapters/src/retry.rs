// studio-adapters/src/retry.rs
// ============================================================================
// Module: Image Generation Retry Policy
// Description: Transient-failure classification and exponential backoff.
// Purpose: Implement the image adapter's retry envelope (12 attempts / 30 min).
// Dependencies: none
// ============================================================================

//! ## Overview
//! Image generation retries a fixed set of transient failure messages, up to
//! 12 attempts or a 30-minute envelope, with exponential backoff capped at 60s.

use std::future::Future;
use std::time::Duration;

use studio_core::interfaces::AdapterError;

use crate::clock::Clock;

/// Substrings that mark an adapter error message as retryable.
const RETRYABLE_MARKERS: &[&str] = &[
    "(e003)",
    "high demand",
    "please try again later",
    "temporarily unavailable",
    "provider_unavailable",
    "request failed",
    "request timed out",
    "polling failed",
];

/// Maximum retry attempts for image generation.
pub const MAX_ATTEMPTS: u32 = 12;

/// Maximum total elapsed time across all retries.
pub const MAX_ELAPSED: Duration = Duration::from_secs(30 * 60);

/// Per-poll maximum wait before a single attempt is abandoned.
pub const MAX_POLL_WAIT: Duration = Duration::from_secs(8 * 60);

/// Poll interval while waiting for a submitted job to complete.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// True if `message` matches one of the known transient-failure markers,
/// case-insensitively.
#[must_use]
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Exponential backoff for `attempt` (1-indexed): `2s * 2^(attempt-1)`,
/// capped at 60s.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    let seconds = 2_u64.saturating_mul(1_u64 << exponent);
    Duration::from_secs(seconds.min(60))
}

/// Runs `op(attempt)` (1-indexed) until it succeeds, fails with a
/// non-retryable error, or exhausts the retry envelope ([`MAX_ATTEMPTS`] or
/// [`MAX_ELAPSED`]), sleeping [`backoff_delay`] between attempts.
///
/// # Errors
///
/// Returns the last [`AdapterError`] once the envelope is exhausted, or
/// immediately propagates any non-transient error.
pub async fn retry_with_backoff<T, F, Fut>(
    clock: &dyn Clock,
    start_attempt: u32,
    mut op: F,
) -> Result<T, AdapterError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let started = clock.now();
    let mut attempt = start_attempt.max(1);
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AdapterError::Transient(message)) if is_retryable(&message) => {
                if attempt >= MAX_ATTEMPTS || clock.now().duration_since(started) >= MAX_ELAPSED {
                    return Err(AdapterError::Transient(message));
                }
                clock.sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;
    use crate::clock::InstantClock;
    use std::sync::Mutex;

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = Mutex::new(Vec::new());
        let clock = InstantClock;
        let result = retry_with_backoff(&clock, 1, |attempt| {
            calls.lock().expect("lock").push(attempt);
            async move {
                if attempt < 3 {
                    Err(AdapterError::Transient("high demand".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(*calls.lock().expect("lock"), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let clock = InstantClock;
        let result: Result<(), AdapterError> =
            retry_with_backoff(&clock, 1, |_attempt| async {
                Err(AdapterError::Transient("invalid api key".to_string()))
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn recognizes_all_documented_transient_markers() {
        assert!(is_retryable(
            "Service is currently unavailable due to high demand. Please try again later. (E003)"
        ));
        assert!(is_retryable("provider_unavailable: try later"));
        assert!(is_retryable("request timed out"));
        assert!(is_retryable("polling failed after 3 attempts"));
    }

    #[test]
    fn rejects_unrelated_messages() {
        assert!(!is_retryable("invalid api key"));
        assert!(!is_retryable("content policy violation"));
    }

    #[test]
    fn backoff_doubles_and_caps_at_sixty_seconds() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(10), Duration::from_secs(60));
    }
}
