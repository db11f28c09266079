//! Port traits: the hexagonal boundary between the meter core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ MeterRuntime / PulseHandler (domain)
//! ```
//!
//! Driven adapters (clock, GPIO lines, storage) implement these traits.
//! The domain consumes them via generics or trait objects, so the core
//! never touches hardware directly and runs unchanged on the host.

use embedded_hal::digital::OutputPin;

use crate::config::MeterConfig;
use crate::error::{ClockError, Error, LineError, StorageError};
use crate::meter::edge::{Edge, EdgePolarity};
use crate::meter::time::Timestamp;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Source of pulse timestamps.
///
/// Implementations must be callable from interrupt context and must never
/// go backward; a regression is treated as a fatal fault by the handler.
pub trait ClockSource: Send + 'static {
    fn now(&self) -> Result<Timestamp, ClockError>;
}

// ───────────────────────────────────────────────────────────────
// Edge sink (what a line delivers raw transitions to)
// ───────────────────────────────────────────────────────────────

/// Receiver of raw transitions on an input line.
///
/// The line adapter guarantees invocations are serialized: the line's
/// interrupt is masked while `on_edge` runs.
pub trait EdgeSink: Send + 'static {
    /// Called once per raw transition.  Must not block.
    fn on_edge(&mut self, edge: Edge);

    /// Called once after the sink has been unregistered; leave any owned
    /// output in its defined off state.
    fn park(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Line port (driven adapter: GPIO)
// ───────────────────────────────────────────────────────────────

/// Acquisition and release of the meter's input/output lines.
pub trait PulseLines {
    /// Output line handed to the pulse handler.
    type Output: OutputPin + Send + 'static;

    /// Claim `gpio` as an output, driven LOW.
    fn acquire_output(&mut self, gpio: i32) -> Result<Self::Output, LineError>;

    /// Claim `gpio` as an input interrupting on `polarity` transitions.
    fn acquire_input(&mut self, gpio: i32, polarity: EdgePolarity) -> Result<(), LineError>;

    /// Attach `sink` to an acquired input.  On error the sink is dropped.
    fn register(&mut self, gpio: i32, sink: Box<dyn EdgeSink>) -> Result<(), LineError>;

    /// Detach and return the sink; no invocation is in flight afterwards.
    fn unregister(&mut self, gpio: i32) -> Option<Box<dyn EdgeSink>>;

    fn release_input(&mut self, gpio: i32);

    /// Release an output whose driver has already been dropped.
    fn release_output(&mut self, gpio: i32);
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists the meter configuration.
///
/// Implementations MUST validate before persisting; invalid values are
/// rejected, not clamped.
pub trait ConfigPort {
    /// Returns [`MeterConfig::default()`] if nothing is stored.
    fn load(&self) -> Result<MeterConfig, Error>;

    fn save(&mut self, config: &MeterConfig) -> Result<(), Error>;
}

// ───────────────────────────────────────────────────────────────
// Count persistence port
// ───────────────────────────────────────────────────────────────

/// Persistence of the cumulative pulse count across restarts.
pub trait CountStore {
    /// `Ok(None)` if no count has been stored yet.
    fn load_count(&self) -> Result<Option<u32>, StorageError>;

    fn save_count(&mut self, count: u32) -> Result<(), StorageError>;
}
