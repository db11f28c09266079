//! Meter core: edge capture and concurrent state exposure.
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ GPIO edge │──▶│ EdgeFilter  │──▶│ PulseHandler │──▶│ MeterState │
//! └───────────┘   │ (debounce)  │   │  (ISR ctx)   │   │ (seqlock + │
//!                 └─────────────┘   └──────┬───────┘   │  atomics)  │
//!                                          │ toggle    └─────┬──────┘
//!                                          ▼                 │ reads / resets
//!                                    output line     ┌───────▼─────────┐
//!                                                    │ MeterAttributes │
//!                                                    └─────────────────┘
//! ```
//!
//! Everything here is pure logic: hardware is reached through the port
//! traits in [`crate::app::ports`].

pub mod attributes;
pub mod edge;
pub mod handler;
pub mod state;
pub mod time;

pub use attributes::{Attribute, AttributeSnapshot, MeterAttributes};
pub use edge::{Edge, EdgeFilter, EdgePolarity};
pub use handler::PulseHandler;
pub use state::{MeterDiagnostics, MeterFault, MeterState, PulseTiming};
pub use time::Timestamp;
