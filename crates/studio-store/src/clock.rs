// studio-store/src/clock.rs
// ============================================================================
// Module: Store Clock
// Description: An injectable wall-clock time source for timestamped writes.
// Purpose: Let the Asset Store, Cache, Journal, and Project Store stamp
//          ISO-8601 timestamps without hard-coding `OffsetDateTime::now_utc`.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Every document this crate writes (projects, policies, cache entries, run
//! summaries, run events) carries an ISO-8601 timestamp. [`Clock`] lets tests
//! inject a fixed time source instead of asserting against wall-clock output.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A source of the current wall-clock time, formatted as ISO-8601/RFC 3339.
pub trait Clock: Send + Sync {
    /// Returns the current time as an RFC 3339 string, e.g.
    /// `2026-01-01T00:00:00Z`.
    fn now_iso8601(&self) -> String;
}

/// The real wall clock, backed by [`OffsetDateTime::now_utc`].
#[derive(Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_iso8601(&self) -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_iso8601(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_produces_an_rfc3339_string() {
        let now = SystemClock.now_iso8601();
        assert!(OffsetDateTime::parse(&now, &Rfc3339).is_ok());
    }

    #[test]
    fn fixed_clock_always_returns_the_same_timestamp() {
        let clock = FixedClock("2026-01-01T00:00:00Z".to_string());
        assert_eq!(clock.now_iso8601(), "2026-01-01T00:00:00Z");
        assert_eq!(clock.now_iso8601(), "2026-01-01T00:00:00Z");
    }
}
