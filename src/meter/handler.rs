//! Pulse handler. Runs once per raw transition in interrupt context.
//!
//! Per accepted pulse: read the clock, filter, publish the new timing block,
//! toggle the mirror, drive the output line, bump the count.  Constant-time,
//! never blocks, never logs.  The line adapter masks the input interrupt for
//! the duration of a call, so the handler owns its filter and output pin
//! exclusively and needs no locking of its own.

use std::sync::Arc;

use embedded_hal::digital::{OutputPin, PinState};

use crate::app::ports::{ClockSource, EdgeSink};
use crate::meter::edge::{Edge, EdgeFilter};
use crate::meter::state::{MeterFault, MeterState};
use crate::meter::time::Timestamp;

pub struct PulseHandler<C, P> {
    state: Arc<MeterState>,
    filter: EdgeFilter,
    clock: C,
    output: P,
}

impl<C: ClockSource, P: OutputPin> PulseHandler<C, P> {
    pub fn new(state: Arc<MeterState>, filter: EdgeFilter, clock: C, output: P) -> Self {
        Self {
            state,
            filter,
            clock,
            output,
        }
    }

    /// Process one raw transition.  Returns `true` if it was counted.
    pub fn handle(&mut self, edge: Edge) -> bool {
        if self.state.fault().is_some() {
            return false;
        }

        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                self.state.latch_fault(MeterFault::from(e));
                return false;
            }
        };

        if !self.filter.admit(edge, now, self.state.debounce_enabled()) {
            self.state.record_suppressed();
            return false;
        }

        self.pulse(now)
    }

    /// Account an accepted pulse at `now` and drive the mirror line.
    fn pulse(&mut self, now: Timestamp) -> bool {
        match self.state.record_pulse(now) {
            Ok(level) => {
                if self.output.set_state(PinState::from(level)).is_err() {
                    self.state.record_output_error();
                }
                true
            }
            Err(e) => {
                self.state.latch_fault(MeterFault::from(e));
                false
            }
        }
    }
}

impl<C, P> EdgeSink for PulseHandler<C, P>
where
    C: ClockSource,
    P: OutputPin + Send + 'static,
{
    fn on_edge(&mut self, edge: Edge) {
        self.handle(edge);
    }

    fn park(&mut self) {
        if self.output.set_low().is_err() {
            self.state.record_output_error();
        }
    }
}
