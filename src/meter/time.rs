//! Timestamps and interval formatting.
//!
//! A [`Timestamp`] is a nanosecond count since the UNIX epoch.  Intervals
//! are plain [`Duration`]s.  Both render with nanosecond precision:
//!
//! | Value     | Format               |
//! |-----------|----------------------|
//! | timestamp | `HH:MM:SS:NNNNNNNNN` |
//! | interval  | `SECONDS.NNNNNNNNN`  |

use core::fmt;
use core::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Clock reading with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn secs(self) -> u64 {
        self.0 / NANOS_PER_SEC
    }

    pub const fn subsec_nanos(self) -> u32 {
        (self.0 % NANOS_PER_SEC) as u32
    }

    /// Time elapsed since `earlier`, or `None` if `earlier` is later.
    pub fn checked_since(self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }

    /// `self + d`, saturating at the far end of the range.
    pub fn saturating_add(self, d: Duration) -> Self {
        Self(
            self.0
                .saturating_add(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)),
        )
    }

    /// Time-of-day view for display.
    pub fn time_of_day(self) -> TimeOfDay {
        TimeOfDay(self)
    }
}

/// `HH:MM:SS:NNNNNNNNN`, hours taken modulo 24, no zone adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay(Timestamp);

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.secs();
        write!(
            f,
            "{:02}:{:02}:{:02}:{:09}",
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60,
            self.0.subsec_nanos()
        )
    }
}

/// `SECONDS.NNNNNNNNN` rendering of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seconds(pub Duration);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0.as_secs(), self.0.subsec_nanos())
    }
}
