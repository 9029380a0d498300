// studio-adapters/src/clock.rs
// ============================================================================
// Module: Adapter Clock
// Description: An injectable time source for retry/backoff loops.
// Purpose: Let tests exercise image-generation retry timing deterministically.
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! Retry and polling loops (image generation's 1s poll cadence, exponential
//! backoff on transient failure) are parameterized over a [`Clock`] so tests
//! can inject an instant-sleeping fake instead of waiting in real time.

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;

/// A time source a retry/poll loop can sleep and measure elapsed time against.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Returns a monotonic instant for elapsed-time measurement.
    fn now(&self) -> Instant;
}

/// The real wall-clock, backed by `tokio::time`.
#[derive(Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that never actually waits, for exercising retry/backoff logic in
/// tests without real elapsed time.
#[derive(Default)]
pub struct InstantClock;

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, _duration: Duration) {}

    fn now(&self) -> Instant {
        Instant::now()
    }
}
