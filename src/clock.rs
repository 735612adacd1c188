//! Time source for the trial clock and the license record.
//!
//! Records store `firstRunTime` and `lastCheckTime` as milliseconds since the
//! Unix epoch, so every time-dependent path reads `Clock::now_millis`. Tests
//! swap in a `MockClock` to step through a trial window or roll time back.

use chrono::{DateTime, Utc};

/// Clock trait for deterministic time in tests.
pub trait Clock: Send + Sync {
    /// Get the current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current time as milliseconds since the Unix epoch, the unit of every
    /// timestamp in a `LicenseRecord`.
    fn now_millis(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }
}

/// System clock using actual wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug, Clone)]
pub struct MockClock {
    now: DateTime<Utc>,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Create a mock clock frozen at the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Create a mock clock frozen at an epoch-millisecond instant, e.g. a
    /// record's `lastCheckTime`.
    pub fn from_millis(ms: i64) -> Self {
        use chrono::TimeZone;

        Self {
            now: Utc
                .timestamp_millis_opt(ms)
                .single()
                .expect("millis in range"),
        }
    }

    /// Create a mock clock from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Self {
        Self {
            now: DateTime::parse_from_rfc3339(s)
                .expect("valid RFC 3339")
                .with_timezone(&Utc),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&mut self, duration: chrono::Duration) {
        self.now = self.now + duration;
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }
}
