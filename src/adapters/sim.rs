//! Host simulation backend for the clock and line ports.
//!
//! `SimLines` stands in for the GPIO controller: it tracks which lines are
//! claimed, keeps a level per output, and dispatches injected edges to the
//! registered sink inside a critical section, which plays the role of the
//! masked interrupt.  `SimProbe` is the test-side handle onto the same board.

use core::cell::RefCell;
use core::convert::Infallible;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use critical_section::Mutex as CsMutex;
use embedded_hal::digital::{ErrorType, OutputPin};
use log::debug;

use crate::app::ports::{ClockSource, EdgeSink, PulseLines};
use crate::error::{ClockError, LineError};
use crate::meter::edge::{Edge, EdgePolarity};
use crate::meter::time::Timestamp;
use crate::pins;

// ── Clock ─────────────────────────────────────────────────────

/// Hand-driven clock.  Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    broken: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn at(ts: Timestamp) -> Self {
        let clock = Self::default();
        clock.set(ts);
        clock
    }

    pub fn set(&self, ts: Timestamp) {
        self.nanos.store(ts.as_nanos(), Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(by, Ordering::AcqRel);
    }

    /// Make every subsequent reading fail with [`ClockError::Unavailable`].
    pub fn break_down(&self) {
        self.broken.store(true, Ordering::Release);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Result<Timestamp, ClockError> {
        if self.broken.load(Ordering::Acquire) {
            return Err(ClockError::Unavailable);
        }
        Ok(Timestamp::from_nanos(self.nanos.load(Ordering::Acquire)))
    }
}

// ── Lines ─────────────────────────────────────────────────────

/// Startup step to fail on the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFailure {
    AcquireOutput,
    AcquireInput,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Input(EdgePolarity),
    Output,
}

struct Board {
    claims: Mutex<HashMap<i32, Claim>>,
    levels: Mutex<HashMap<i32, Arc<AtomicBool>>>,
    sinks: CsMutex<RefCell<HashMap<i32, Box<dyn EdgeSink>>>>,
    fail_next: Mutex<Option<SimFailure>>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            claims: Mutex::default(),
            levels: Mutex::default(),
            sinks: CsMutex::new(RefCell::new(HashMap::new())),
            fail_next: Mutex::default(),
        }
    }
}

impl Board {
    fn claims(&self) -> MutexGuard<'_, HashMap<i32, Claim>> {
        self.claims.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn levels(&self) -> MutexGuard<'_, HashMap<i32, Arc<AtomicBool>>> {
        self.levels.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn take_failure(&self, step: SimFailure) -> bool {
        let mut slot = self.fail_next.lock().unwrap_or_else(|p| p.into_inner());
        if *slot == Some(step) {
            *slot = None;
            true
        } else {
            false
        }
    }

    fn claim(&self, gpio: i32, claim: Claim) -> Result<(), LineError> {
        if !pins::is_valid_gpio(gpio) {
            return Err(LineError::InvalidPin(gpio));
        }
        let mut claims = self.claims();
        if claims.contains_key(&gpio) {
            return Err(LineError::Busy(gpio));
        }
        claims.insert(gpio, claim);
        Ok(())
    }
}

/// Simulated output line.  Writes land on the board and are visible
/// through [`SimProbe::level`].
#[derive(Debug)]
pub struct SimOutput {
    level: Arc<AtomicBool>,
}

impl ErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.store(false, Ordering::Release);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level.store(true, Ordering::Release);
        Ok(())
    }
}

/// In-memory GPIO controller.
#[derive(Default)]
pub struct SimLines {
    board: Arc<Board>,
}

impl SimLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            board: Arc::clone(&self.board),
        }
    }
}

impl PulseLines for SimLines {
    type Output = SimOutput;

    fn acquire_output(&mut self, gpio: i32) -> Result<SimOutput, LineError> {
        if self.board.take_failure(SimFailure::AcquireOutput) {
            return Err(LineError::ConfigFailed(-1));
        }
        self.board.claim(gpio, Claim::Output)?;
        let level = Arc::new(AtomicBool::new(false));
        self.board.levels().insert(gpio, Arc::clone(&level));
        debug!("sim: GPIO{} acquired as output", gpio);
        Ok(SimOutput { level })
    }

    fn acquire_input(&mut self, gpio: i32, polarity: EdgePolarity) -> Result<(), LineError> {
        if self.board.take_failure(SimFailure::AcquireInput) {
            return Err(LineError::ConfigFailed(-1));
        }
        self.board.claim(gpio, Claim::Input(polarity))?;
        debug!("sim: GPIO{} acquired as input ({:?})", gpio, polarity);
        Ok(())
    }

    fn register(&mut self, gpio: i32, sink: Box<dyn EdgeSink>) -> Result<(), LineError> {
        if self.board.take_failure(SimFailure::Register) {
            return Err(LineError::RegisterFailed(-1));
        }
        if !matches!(self.board.claims().get(&gpio), Some(Claim::Input(_))) {
            return Err(LineError::RegisterFailed(-1));
        }
        critical_section::with(|cs| {
            let mut sinks = self.board.sinks.borrow_ref_mut(cs);
            if sinks.contains_key(&gpio) {
                return Err(LineError::Busy(gpio));
            }
            sinks.insert(gpio, sink);
            Ok(())
        })
    }

    fn unregister(&mut self, gpio: i32) -> Option<Box<dyn EdgeSink>> {
        critical_section::with(|cs| self.board.sinks.borrow_ref_mut(cs).remove(&gpio))
    }

    fn release_input(&mut self, gpio: i32) {
        let mut claims = self.board.claims();
        if matches!(claims.get(&gpio), Some(Claim::Input(_))) {
            claims.remove(&gpio);
            debug!("sim: GPIO{} input released", gpio);
        }
    }

    fn release_output(&mut self, gpio: i32) {
        let mut claims = self.board.claims();
        if claims.get(&gpio) == Some(&Claim::Output) {
            claims.remove(&gpio);
            debug!("sim: GPIO{} output released", gpio);
        }
    }
}

/// Test-side view of a [`SimLines`] board.  Cheap to clone and `Send`, so
/// it can drive edges from a separate thread.
#[derive(Clone)]
pub struct SimProbe {
    board: Arc<Board>,
}

impl SimProbe {
    /// Deliver one raw transition.  Returns `false` if no sink is attached.
    pub fn edge(&self, gpio: i32, edge: Edge) -> bool {
        critical_section::with(|cs| {
            match self.board.sinks.borrow_ref_mut(cs).get_mut(&gpio) {
                Some(sink) => {
                    sink.on_edge(edge);
                    true
                }
                None => false,
            }
        })
    }

    /// A full high/low cycle: one edge of each polarity.
    pub fn pulse(&self, gpio: i32) -> bool {
        let rose = self.edge(gpio, Edge::Rising);
        let fell = self.edge(gpio, Edge::Falling);
        rose && fell
    }

    /// Last level driven on an output, even after it has been released.
    pub fn level(&self, gpio: i32) -> Option<bool> {
        self.board
            .levels()
            .get(&gpio)
            .map(|l| l.load(Ordering::Acquire))
    }

    pub fn is_claimed(&self, gpio: i32) -> bool {
        self.board.claims().contains_key(&gpio)
    }

    pub fn has_sink(&self, gpio: i32) -> bool {
        critical_section::with(|cs| self.board.sinks.borrow_ref(cs).contains_key(&gpio))
    }

    /// Fail the next attempt at `step`.
    pub fn fail_next(&self, step: SimFailure) {
        *self.board.fail_next.lock().unwrap_or_else(|p| p.into_inner()) = Some(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(Arc<AtomicU64>);

    impl EdgeSink for Counter {
        fn on_edge(&mut self, _edge: Edge) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        fn park(&mut self) {}
    }

    #[test]
    fn manual_clock_shared_between_clones() {
        let a = ManualClock::at(Timestamp::from_millis(10));
        let b = a.clone();
        a.advance(Duration::from_millis(5));
        assert_eq!(b.now(), Ok(Timestamp::from_millis(15)));
        b.break_down();
        assert_eq!(a.now(), Err(ClockError::Unavailable));
    }

    #[test]
    fn double_claim_is_busy() {
        let mut lines = SimLines::new();
        let _out = lines.acquire_output(7).unwrap();
        assert_eq!(
            lines.acquire_input(7, EdgePolarity::Rising),
            Err(LineError::Busy(7))
        );
    }

    #[test]
    fn reserved_pins_rejected() {
        let mut lines = SimLines::new();
        assert_eq!(
            lines.acquire_input(23, EdgePolarity::Rising),
            Err(LineError::InvalidPin(23))
        );
        assert!(matches!(lines.acquire_output(99), Err(LineError::InvalidPin(99))));
    }

    #[test]
    fn register_requires_acquired_input() {
        let mut lines = SimLines::new();
        let hits = Arc::new(AtomicU64::new(0));
        assert!(lines.register(6, Box::new(Counter(Arc::clone(&hits)))).is_err());

        lines.acquire_input(6, EdgePolarity::Rising).unwrap();
        lines.register(6, Box::new(Counter(Arc::clone(&hits)))).unwrap();
        let probe = lines.probe();
        assert!(probe.pulse(6));
        assert_eq!(hits.load(Ordering::Relaxed), 2);

        assert!(lines.unregister(6).is_some());
        assert!(!probe.edge(6, Edge::Rising));
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut lines = SimLines::new();
        lines.probe().fail_next(SimFailure::AcquireInput);
        assert!(lines.acquire_input(6, EdgePolarity::Rising).is_err());
        assert!(lines.acquire_input(6, EdgePolarity::Rising).is_ok());
    }

    #[test]
    fn output_level_survives_release() {
        let mut lines = SimLines::new();
        let probe = lines.probe();
        let mut out = lines.acquire_output(7).unwrap();
        assert_eq!(probe.level(7), Some(false));
        out.set_high().unwrap();
        drop(out);
        lines.release_output(7);
        assert!(!probe.is_claimed(7));
        assert_eq!(probe.level(7), Some(true));
    }
}
