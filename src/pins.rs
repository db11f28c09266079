//! GPIO / peripheral pin assignments for the wattmeter board.
//!
//! Single source of truth for the default line assignment.  Installations
//! can remap both lines through [`MeterConfig`](crate::config::MeterConfig).

// ---------------------------------------------------------------------------
// Meter pulse input
// ---------------------------------------------------------------------------

/// Opto-isolated S0 pulse output of the utility meter, interrupt-driven.
/// External pull-down; the opto pulls the line HIGH for each impulse.
pub const METER_INPUT_GPIO: i32 = 6;

// ---------------------------------------------------------------------------
// Pulse mirror output
// ---------------------------------------------------------------------------

/// Indicator LED toggled on every accepted pulse (active HIGH).
pub const METER_OUTPUT_GPIO: i32 = 7;

// ---------------------------------------------------------------------------
// Part limits
// ---------------------------------------------------------------------------

/// Highest GPIO number on the ESP32-S3.
pub const MAX_GPIO: i32 = 48;

/// GPIO 22–25 are not bonded out on the ESP32-S3.
pub const fn is_valid_gpio(pin: i32) -> bool {
    pin >= 0 && pin <= MAX_GPIO && !(pin >= 22 && pin <= 25)
}
