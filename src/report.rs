//! Derived power rate and the fixed 8-byte report record.
//!
//! With one pulse per watt-hour the instantaneous power is
//! `3600 / interval_secs` watts.  The record pairs it with the cumulative
//! count:
//!
//! ```text
//! ┌──────────────┬────────────────────┐
//! │ rate: u32 LE │ cumulative: u32 LE │
//! └──────────────┴────────────────────┘
//! ```

use core::time::Duration;

use crate::meter::MeterAttributes;

pub const REPORT_LEN: usize = 8;

/// `scale / interval_secs`, truncated.  Zero before the first real interval;
/// saturates for very short intervals.
pub fn derive_rate(interval: Duration, scale: u32) -> u32 {
    let nanos = interval.as_nanos();
    if nanos == 0 {
        return 0;
    }
    let rate = u128::from(scale) * 1_000_000_000 / nanos;
    u32::try_from(rate).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReport {
    pub rate: u32,
    pub cumulative: u32,
}

impl PowerReport {
    /// Build a record from the live attribute surface.
    pub fn sample(attrs: &MeterAttributes, scale: u32) -> Self {
        Self {
            rate: derive_rate(attrs.timing().interval, scale),
            cumulative: attrs.read_pulse_count(),
        }
    }

    pub fn to_bytes(self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[..4].copy_from_slice(&self.rate.to_le_bytes());
        buf[4..].copy_from_slice(&self.cumulative.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: [u8; REPORT_LEN]) -> Self {
        let [r0, r1, r2, r3, c0, c1, c2, c3] = buf;
        Self {
            rate: u32::from_le_bytes([r0, r1, r2, r3]),
            cumulative: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}
