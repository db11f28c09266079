//! Edge filter: decides whether a raw transition becomes a pulse.
//!
//! Two checks, in order:
//!
//! 1. **Polarity**: only transitions in the configured direction count.
//! 2. **Debounce**: while enabled, a transition arriving less than the
//!    debounce window after the previous *accepted* one is discarded.
//!
//! Debouncing is a binary policy held in [`MeterState`]; [`configure`]
//! flips it from accessor context and the filter picks it up on the next
//! edge.  Pulses already delivered are never revisited.

use core::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::meter::state::MeterState;
use crate::meter::time::Timestamp;

/// Direction of a raw transition on the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Which transitions are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgePolarity {
    Rising,
    Falling,
}

impl EdgePolarity {
    pub fn matches(self, edge: Edge) -> bool {
        matches!(
            (self, edge),
            (Self::Rising, Edge::Rising) | (Self::Falling, Edge::Falling)
        )
    }

    /// The transition this polarity counts.
    pub fn edge(self) -> Edge {
        match self {
            Self::Rising => Edge::Rising,
            Self::Falling => Edge::Falling,
        }
    }
}

/// Handler-owned filter state for one input line.
#[derive(Debug)]
pub struct EdgeFilter {
    polarity: EdgePolarity,
    window: Duration,
    last_accepted: Option<Timestamp>,
}

impl EdgeFilter {
    pub fn new(polarity: EdgePolarity, window: Duration) -> Self {
        Self {
            polarity,
            window,
            last_accepted: None,
        }
    }

    /// Returns `true` if the transition at `at` is a pulse.
    pub fn admit(&mut self, edge: Edge, at: Timestamp, debounce: bool) -> bool {
        if !self.polarity.matches(edge) {
            return false;
        }
        // A clock that ran backward is not a bounce; let the handler see it
        // and latch the fault.
        let bouncing = self.last_accepted.is_some_and(|previous| {
            at.checked_since(previous).is_some_and(|gap| gap < self.window)
        });
        if debounce && bouncing {
            return false;
        }
        self.last_accepted = Some(at);
        true
    }
}

/// Turn debouncing on or off.  Safe from any accessor context.
pub fn configure(state: &MeterState, enabled: bool) {
    let previous = state.set_debounce_enabled(enabled);
    if previous != enabled {
        info!("Meter: debounce {}", if enabled { "on" } else { "off" });
    }
}
