//! Lifecycle manager. Brings the meter up, supervises it, tears it down.
//!
//! ```text
//!  start:  validate ─▶ probe clock ─▶ state (+restore) ─▶ output ─▶ input ─▶ register
//!  stop:   unregister ─▶ park output ─▶ release input ─▶ release output
//! ```
//!
//! Startup is all-or-nothing: a failure at any step releases what the
//! earlier steps acquired.  Teardown runs exactly once, either from
//! [`MeterRuntime::shutdown`] or from `Drop`.

use std::sync::Arc;

use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use crate::app::ports::{ClockSource, CountStore, PulseLines};
use crate::config::MeterConfig;
use crate::error::{Error, Result};
use crate::meter::{EdgeFilter, MeterAttributes, MeterDiagnostics, MeterState, PulseHandler};

pub struct MeterRuntime<L: PulseLines> {
    config: MeterConfig,
    lines: L,
    state: Arc<MeterState>,
    /// Count at the last successful checkpoint.
    saved_count: Option<u32>,
    running: bool,
}

impl<L: PulseLines> MeterRuntime<L> {
    /// Acquire both lines and attach the pulse handler.
    ///
    /// `store` is consulted only when `config.persist_count` is set; a
    /// count that cannot be read is logged and counting starts from zero.
    pub fn start<C: ClockSource>(
        config: MeterConfig,
        clock: C,
        mut lines: L,
        store: Option<&dyn CountStore>,
    ) -> Result<Self> {
        config.validate()?;

        let now = clock.now().map_err(|e| {
            error!("Meter: clock probe failed: {}", e);
            Error::Clock(e)
        })?;

        let state = Arc::new(MeterState::new(now, config.debounce_enabled));
        let saved_count = if config.persist_count {
            restore_count(&state, store)
        } else {
            None
        };

        let mut output = lines.acquire_output(config.output_gpio)?;
        if state.output() && output.set_high().is_err() {
            drop(output);
            lines.release_output(config.output_gpio);
            return Err(Error::Init("output line rejected restored level"));
        }

        if let Err(e) = lines.acquire_input(config.input_gpio, config.edge) {
            drop(output);
            lines.release_output(config.output_gpio);
            return Err(e.into());
        }

        let filter = EdgeFilter::new(config.edge, config.debounce_window());
        let handler = PulseHandler::new(Arc::clone(&state), filter, clock, output);
        if let Err(e) = lines.register(config.input_gpio, Box::new(handler)) {
            lines.release_input(config.input_gpio);
            lines.release_output(config.output_gpio);
            return Err(e.into());
        }

        info!(
            "Meter: started (in=GPIO{} {:?}, out=GPIO{}, debounce {} ms {})",
            config.input_gpio,
            config.edge,
            config.output_gpio,
            config.debounce_ms,
            if config.debounce_enabled { "on" } else { "off" },
        );

        Ok(Self {
            config,
            lines,
            state,
            saved_count,
            running: true,
        })
    }

    /// A new handle onto the attribute surface.
    pub fn attributes(&self) -> MeterAttributes {
        MeterAttributes::new(Arc::clone(&self.state))
    }

    pub fn diagnostics(&self) -> MeterDiagnostics {
        self.state.diagnostics()
    }

    /// Surface a latched fault.  Once this fails it keeps failing: the
    /// handler has stopped counting and the meter must be restarted.
    pub fn supervise(&self) -> Result<()> {
        match self.state.fault() {
            Some(fault) => Err(Error::Clock(fault.into())),
            None => Ok(()),
        }
    }

    /// Persist the count if it moved since the last checkpoint.  Returns
    /// `true` if anything was written.
    pub fn checkpoint(&mut self, store: &mut dyn CountStore) -> Result<bool> {
        if !self.config.persist_count {
            return Ok(false);
        }
        let count = self.state.pulse_count();
        if self.saved_count == Some(count) {
            return Ok(false);
        }
        store.save_count(count)?;
        self.saved_count = Some(count);
        Ok(true)
    }

    /// Final checkpoint (if persistence is on), then teardown.  Teardown
    /// happens even if the checkpoint fails.
    pub fn shutdown(mut self, store: Option<&mut dyn CountStore>) -> Result<()> {
        let saved = match store {
            Some(store) => self.checkpoint(store).map(|_| ()),
            None => Ok(()),
        };
        self.teardown();
        saved
    }

    fn teardown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        match self.lines.unregister(self.config.input_gpio) {
            Some(mut handler) => handler.park(),
            None => warn!("Meter: no handler attached at teardown"),
        }
        self.lines.release_input(self.config.input_gpio);
        self.lines.release_output(self.config.output_gpio);
        info!("Meter: stopped at {} pulses", self.state.pulse_count());
    }
}

impl<L: PulseLines> Drop for MeterRuntime<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn restore_count(state: &MeterState, store: Option<&dyn CountStore>) -> Option<u32> {
    let Some(store) = store else {
        warn!("Meter: persist_count set but no store given, starting from 0");
        return None;
    };
    match store.load_count() {
        Ok(Some(count)) => {
            state.restore(count);
            info!("Meter: restored count {}", count);
            Some(count)
        }
        Ok(None) => {
            info!("Meter: no stored count, starting from 0");
            None
        }
        Err(e) => {
            warn!("Meter: stored count unreadable ({}), starting from 0", e);
            None
        }
    }
}
