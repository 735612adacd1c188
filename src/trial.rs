//! Trial window arithmetic and clock-rollback detection.
//!
//! The trial is measured from `first_run_time`. Every status check that is
//! allowed to write advances the stored `last_check_time`; a wall clock that
//! reads earlier than that checkpoint forfeits the trial.

use crate::clock::Clock;
use crate::store::file::LicenseStore;
use crate::store::record::LicenseRecord;
use crate::LicenseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Unit of a trial duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialUnit {
    /// 86,400,000 ms.
    Days,
    /// 3,600,000 ms.
    Hours,
    /// 60,000 ms.
    Minutes,
    /// 1,000 ms.
    Seconds,
}

impl TrialUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            TrialUnit::Days => DAY_MS,
            TrialUnit::Hours => HOUR_MS,
            TrialUnit::Minutes => MINUTE_MS,
            TrialUnit::Seconds => SECOND_MS,
        }
    }
}

impl fmt::Display for TrialUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrialUnit::Days => "days",
            TrialUnit::Hours => "hours",
            TrialUnit::Minutes => "minutes",
            TrialUnit::Seconds => "seconds",
        };
        f.write_str(s)
    }
}

impl FromStr for TrialUnit {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(TrialUnit::Days),
            "hour" | "hours" => Ok(TrialUnit::Hours),
            "minute" | "minutes" => Ok(TrialUnit::Minutes),
            "second" | "seconds" => Ok(TrialUnit::Seconds),
            other => Err(LicenseError::ConfigError(format!(
                "unknown trial unit '{}'",
                other
            ))),
        }
    }
}

/// Configured trial length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialWindow {
    /// Number of units.
    pub duration: u32,
    /// Unit of `duration`.
    pub unit: TrialUnit,
}

impl TrialWindow {
    /// Create a trial window.
    pub fn new(duration: u32, unit: TrialUnit) -> Self {
        Self { duration, unit }
    }

    /// Window length in milliseconds.
    pub fn millis(&self) -> i64 {
        i64::from(self.duration) * self.unit.millis()
    }
}

/// Remaining time reduced to the largest whole unit, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingTime {
    /// Whole units remaining.
    pub value: i64,
    /// Unit of `value`.
    pub unit: TrialUnit,
}

impl RemainingTime {
    /// Reduce a millisecond count to days, else hours, else minutes, else
    /// seconds.
    pub fn from_millis(ms: i64) -> Self {
        let ms = ms.max(0);
        for unit in [TrialUnit::Days, TrialUnit::Hours, TrialUnit::Minutes] {
            let value = ms / unit.millis();
            if value >= 1 {
                return Self { value, unit };
            }
        }
        Self {
            value: ms / SECOND_MS,
            unit: TrialUnit::Seconds,
        }
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Trial status as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialStatus {
    /// A trial record exists.
    pub initialized: bool,
    /// The trial can no longer be used.
    pub expired: bool,
    /// The wall clock was behind the last checkpoint.
    pub tampered: bool,
    /// Human-readable remaining time.
    pub remaining: RemainingTime,
    /// Remaining time in milliseconds.
    pub remaining_ms: i64,
    /// Trial start (ms epoch).
    pub start_time: i64,
    /// Trial end (ms epoch).
    pub end_time: i64,
}

impl TrialStatus {
    /// Status when no trial record exists.
    pub fn uninitialized() -> Self {
        Self {
            initialized: false,
            expired: false,
            tampered: false,
            remaining: RemainingTime::from_millis(0),
            remaining_ms: 0,
            start_time: 0,
            end_time: 0,
        }
    }
}

/// Computes trial status for a record.
#[derive(Debug, Clone, Copy)]
pub struct TrialClock {
    window: TrialWindow,
}

impl TrialClock {
    /// Create a trial clock for the given window.
    pub fn new(window: TrialWindow) -> Self {
        Self { window }
    }

    /// The configured window.
    pub fn window(&self) -> TrialWindow {
        self.window
    }

    /// Pure status computation at `now` (ms epoch).
    ///
    /// Rollback is checked first: `now < last_check_time` is expired no matter
    /// how much of the window is left.
    pub fn evaluate(&self, record: &LicenseRecord, now: i64) -> TrialStatus {
        let start_time = record.first_run_time;
        let end_time = start_time.saturating_add(self.window.millis());

        if now < record.last_check_time {
            return TrialStatus {
                initialized: true,
                expired: true,
                tampered: true,
                remaining: RemainingTime::from_millis(0),
                remaining_ms: 0,
                start_time,
                end_time,
            };
        }

        let remaining_ms = (end_time - now).max(0);
        TrialStatus {
            initialized: true,
            expired: remaining_ms == 0,
            tampered: false,
            remaining: RemainingTime::from_millis(remaining_ms),
            remaining_ms,
            start_time,
            end_time,
        }
    }

    /// Evaluate and advance the stored checkpoint to `now`.
    ///
    /// On rollback the checkpoint is left where it is; it never moves
    /// backwards. A failed write is logged and does not change the status.
    pub fn check(
        &self,
        store: &LicenseStore,
        record: &mut LicenseRecord,
        clock: &dyn Clock,
    ) -> TrialStatus {
        let now = clock.now_millis();
        let status = self.evaluate(record, now);

        if status.tampered {
            warn!(
                last_check = record.last_check_time,
                now, "System clock is behind the last license check"
            );
            return status;
        }

        record.last_check_time = now;
        if !store.save(record) {
            warn!("Failed to persist trial checkpoint");
        }
        status
    }
}
