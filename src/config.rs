//! Meter configuration parameters
//!
//! Read once at startup by the lifecycle manager; changing any of them
//! requires a restart.  Values can be overridden from NVS or a JSON blob.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::meter::edge::EdgePolarity;
use crate::pins;

/// Debounce window applied by the edge filter when debouncing is on.
pub const DEFAULT_DEBOUNCE_MS: u32 = 200;

/// One pulse per watt-hour: `3600 / interval_secs` gives watts.
pub const DEFAULT_RATE_SCALE: u32 = 3600;

/// TCP port of the report server.
pub const DEFAULT_REPORT_PORT: u16 = 9123;

/// Core meter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    // --- Lines ---
    /// GPIO carrying the meter pulses
    pub input_gpio: i32,
    /// GPIO mirroring the pulse parity
    pub output_gpio: i32,
    /// Which transition counts as a pulse
    pub edge: EdgePolarity,

    // --- Edge filter ---
    /// Debounce window (milliseconds)
    pub debounce_ms: u32,
    /// Debounce state at boot
    pub debounce_enabled: bool,

    // --- Persistence ---
    /// Restore and save the cumulative count across restarts
    pub persist_count: bool,
    /// Minimum time between count checkpoints (seconds)
    pub checkpoint_interval_secs: u32,

    // --- Reporting ---
    /// Report server listen port
    pub report_port: u16,
    /// Numerator of the derived rate (`rate = scale / interval_secs`)
    pub rate_scale: u32,
    /// Telemetry log interval (seconds)
    pub telemetry_interval_secs: u32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            // Lines
            input_gpio: pins::METER_INPUT_GPIO,
            output_gpio: pins::METER_OUTPUT_GPIO,
            edge: EdgePolarity::Rising,

            // Edge filter
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            debounce_enabled: true,

            // Persistence
            persist_count: false,
            checkpoint_interval_secs: 60,

            // Reporting
            report_port: DEFAULT_REPORT_PORT,
            rate_scale: DEFAULT_RATE_SCALE,
            telemetry_interval_secs: 60,
        }
    }
}

impl MeterConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), Error> {
        if !pins::is_valid_gpio(self.input_gpio) {
            return Err(Error::Config("input_gpio is not a usable GPIO"));
        }
        if !pins::is_valid_gpio(self.output_gpio) {
            return Err(Error::Config("output_gpio is not a usable GPIO"));
        }
        if self.input_gpio == self.output_gpio {
            return Err(Error::Config("input_gpio and output_gpio must differ"));
        }
        if !(1..=10_000).contains(&self.debounce_ms) {
            return Err(Error::Config("debounce_ms must be 1–10000"));
        }
        if !(1..=86_400).contains(&self.checkpoint_interval_secs) {
            return Err(Error::Config("checkpoint_interval_secs must be 1–86400"));
        }
        if self.report_port == 0 {
            return Err(Error::Config("report_port must be non-zero"));
        }
        if self.rate_scale == 0 {
            return Err(Error::Config("rate_scale must be non-zero"));
        }
        if !(1..=86_400).contains(&self.telemetry_interval_secs) {
            return Err(Error::Config("telemetry_interval_secs must be 1–86400"));
        }
        Ok(())
    }

    /// Parse a (possibly partial) JSON override; missing fields keep their
    /// defaults.  The result is validated.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON config"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Debounce window as a duration.
    pub fn debounce_window(&self) -> core::time::Duration {
        core::time::Duration::from_millis(u64::from(self.debounce_ms))
    }
}
