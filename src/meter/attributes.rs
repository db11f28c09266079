//! Attribute interface: the meter's externally visible surface.
//!
//! | Attribute     | Access | Text format          |
//! |---------------|--------|----------------------|
//! | `pulse_count` | rw     | unsigned integer     |
//! | `output`      | ro     | `0` / `1`            |
//! | `last_time`   | ro     | `HH:MM:SS:NNNNNNNNN` |
//! | `diff_time`   | ro     | `SECONDS.NNNNNNNNN`  |
//! | `debounce`    | rw     | `0` / `1`            |
//!
//! Every call is independent: reading the count and then the interval may
//! observe two different pulses.  Within one call the timing fields always
//! come from the same pulse.

use core::fmt::Write as _;
use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::error::AttributeError;
use crate::meter::edge;
use crate::meter::state::{MeterState, PulseTiming};
use crate::meter::time::Seconds;

/// Rendered attribute value.
pub type AttrText = heapless::String<32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    PulseCount,
    Output,
    LastTime,
    DiffTime,
    Debounce,
}

impl Attribute {
    pub const ALL: [Self; 5] = [
        Self::PulseCount,
        Self::Output,
        Self::LastTime,
        Self::DiffTime,
        Self::Debounce,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PulseCount => "pulse_count",
            Self::Output => "output",
            Self::LastTime => "last_time",
            Self::DiffTime => "diff_time",
            Self::Debounce => "debounce",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Self::PulseCount | Self::Debounce)
    }
}

/// All five values, each read independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSnapshot {
    pub pulse_count: u32,
    pub output: bool,
    pub last_time: AttrText,
    pub diff_time: AttrText,
    pub debounce: bool,
}

/// Cheap, cloneable handle onto the shared state.
#[derive(Clone)]
pub struct MeterAttributes {
    state: Arc<MeterState>,
}

impl MeterAttributes {
    pub fn new(state: Arc<MeterState>) -> Self {
        Self { state }
    }

    // ── Typed accessors ───────────────────────────────────────

    pub fn read_pulse_count(&self) -> u32 {
        self.state.pulse_count()
    }

    /// Used to reset accumulation; timing fields are left alone.
    pub fn write_pulse_count(&self, value: u32) {
        self.state.set_pulse_count(value);
        info!("Meter: pulse count set to {}", value);
    }

    pub fn read_output_mirror(&self) -> bool {
        self.state.output()
    }

    pub fn read_last_timestamp(&self) -> AttrText {
        render(format_args!("{}", self.state.timing().last.time_of_day()))
    }

    pub fn read_last_interval(&self) -> AttrText {
        render(format_args!("{}", Seconds(self.state.timing().interval)))
    }

    pub fn read_debounce_enabled(&self) -> bool {
        self.state.debounce_enabled()
    }

    pub fn write_debounce_enabled(&self, enabled: bool) {
        edge::configure(&self.state, enabled);
    }

    /// Raw timing block, for collaborators that need numbers, not text.
    pub fn timing(&self) -> PulseTiming {
        self.state.timing()
    }

    // ── Text surface ──────────────────────────────────────────

    pub fn show(&self, attr: Attribute) -> AttrText {
        match attr {
            Attribute::PulseCount => render(format_args!("{}", self.read_pulse_count())),
            Attribute::Output => flag(self.read_output_mirror()),
            Attribute::LastTime => self.read_last_timestamp(),
            Attribute::DiffTime => self.read_last_interval(),
            Attribute::Debounce => flag(self.read_debounce_enabled()),
        }
    }

    /// Parse and apply a textual write.  On error nothing changes.
    pub fn store(&self, attr: Attribute, text: &str) -> Result<(), AttributeError> {
        let text = text.trim();
        match attr {
            Attribute::PulseCount => {
                let value = text.parse::<u32>().map_err(|_| AttributeError::InvalidValue)?;
                self.write_pulse_count(value);
                Ok(())
            }
            Attribute::Debounce => {
                let enabled = match text {
                    "0" => false,
                    "1" => true,
                    _ => return Err(AttributeError::InvalidValue),
                };
                self.write_debounce_enabled(enabled);
                Ok(())
            }
            Attribute::Output | Attribute::LastTime | Attribute::DiffTime => {
                Err(AttributeError::ReadOnly)
            }
        }
    }

    /// Name-addressed variant of [`show`](Self::show).
    pub fn show_named(&self, name: &str) -> Result<AttrText, AttributeError> {
        let attr = Attribute::from_name(name).ok_or(AttributeError::UnknownAttribute)?;
        Ok(self.show(attr))
    }

    /// Name-addressed variant of [`store`](Self::store).
    pub fn store_named(&self, name: &str, text: &str) -> Result<(), AttributeError> {
        let attr = Attribute::from_name(name).ok_or(AttributeError::UnknownAttribute)?;
        self.store(attr, text)
    }

    pub fn snapshot(&self) -> AttributeSnapshot {
        AttributeSnapshot {
            pulse_count: self.read_pulse_count(),
            output: self.read_output_mirror(),
            last_time: self.read_last_timestamp(),
            diff_time: self.read_last_interval(),
            debounce: self.read_debounce_enabled(),
        }
    }
}

fn render(args: core::fmt::Arguments<'_>) -> AttrText {
    let mut s = AttrText::new();
    // Longest value is 20 digits + '.' + 9 digits; always fits.
    let _ = s.write_fmt(args);
    s
}

fn flag(on: bool) -> AttrText {
    render(format_args!("{}", u8::from(on)))
}
