//! ESP-IDF GPIO backend for the line port.
//!
//! Lines are configured through the raw `gpio_config` driver.  The pulse
//! sink is boxed into an [`IsrSlot`] whose pointer is handed to
//! `gpio_isr_handler_add` as the handler argument; the per-pin ISR
//! dispatcher never re-enters a handler for the same pin, which gives the
//! sink the exclusive access [`EdgeSink`] requires.

use core::ffi::c_void;

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use esp_idf_svc::sys::*;
use log::{info, warn};

use crate::app::ports::{EdgeSink, PulseLines};
use crate::error::LineError;
use crate::meter::edge::{Edge, EdgePolarity};
use crate::pins;

/// Max lines of each kind held at once.
const MAX_LINES: usize = 2;

struct IsrSlot {
    edge: Edge,
    sink: Box<dyn EdgeSink>,
}

unsafe extern "C" fn meter_gpio_isr(arg: *mut c_void) {
    // SAFETY: `arg` is the slot leaked in `register` and reclaimed only
    // after `gpio_isr_handler_remove` returns.  The dispatcher serializes
    // calls for one pin, so this is the only live reference.
    let slot = unsafe { &mut *arg.cast::<IsrSlot>() };
    slot.sink.on_edge(slot.edge);
}

/// `esp_err_t` from a failed level write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EspGpioError(pub i32);

impl embedded_hal::digital::Error for EspGpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Configured push-pull output.
#[derive(Debug)]
pub struct EspOutput {
    gpio: i32,
}

impl EspOutput {
    fn write(&mut self, level: u32) -> Result<(), EspGpioError> {
        // SAFETY: register write on a pin configured as output in
        // `acquire_output`; ISR-safe.
        let ret = unsafe { gpio_set_level(self.gpio, level) };
        if ret != ESP_OK as i32 {
            return Err(EspGpioError(ret));
        }
        Ok(())
    }
}

impl ErrorType for EspOutput {
    type Error = EspGpioError;
}

impl OutputPin for EspOutput {
    fn set_low(&mut self) -> Result<(), EspGpioError> {
        self.write(0)
    }

    fn set_high(&mut self) -> Result<(), EspGpioError> {
        self.write(1)
    }
}

#[derive(Default)]
pub struct EspLines {
    inputs: heapless::Vec<(i32, EdgePolarity), MAX_LINES>,
    outputs: heapless::Vec<i32, MAX_LINES>,
    slots: heapless::Vec<(i32, *mut IsrSlot), MAX_LINES>,
    isr_service: bool,
}

impl EspLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_claimed(&self, gpio: i32) -> bool {
        self.inputs.iter().any(|&(g, _)| g == gpio) || self.outputs.contains(&gpio)
    }

    fn check_free(&self, gpio: i32) -> Result<(), LineError> {
        if !pins::is_valid_gpio(gpio) {
            return Err(LineError::InvalidPin(gpio));
        }
        if self.is_claimed(gpio) {
            return Err(LineError::Busy(gpio));
        }
        Ok(())
    }

    fn install_isr_service(&mut self) -> Result<(), LineError> {
        if self.isr_service {
            return Ok(());
        }
        // SAFETY: ESP_ERR_INVALID_STATE means another component installed
        // the service already, which is fine.
        let ret = unsafe { gpio_install_isr_service(0) };
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(LineError::IsrInstallFailed(ret));
        }
        self.isr_service = true;
        Ok(())
    }

    fn detach(&mut self, gpio: i32) -> Option<Box<IsrSlot>> {
        let idx = self.slots.iter().position(|&(g, _)| g == gpio)?;
        let (_, raw) = self.slots.swap_remove(idx);
        // SAFETY: after `gpio_isr_handler_remove` the dispatcher no longer
        // references `raw`, so ownership returns to us.
        unsafe {
            gpio_intr_disable(gpio);
            gpio_isr_handler_remove(gpio);
            Some(Box::from_raw(raw))
        }
    }
}

impl PulseLines for EspLines {
    type Output = EspOutput;

    fn acquire_output(&mut self, gpio: i32) -> Result<EspOutput, LineError> {
        self.check_free(gpio)?;
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << gpio,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: `cfg` is fully initialised and `gpio` range-checked.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(LineError::ConfigFailed(ret));
        }
        let mut out = EspOutput { gpio };
        if let Err(EspGpioError(ret)) = out.set_low() {
            // SAFETY: undo the configuration above.
            unsafe { gpio_reset_pin(gpio) };
            return Err(LineError::ConfigFailed(ret));
        }
        if self.outputs.push(gpio).is_err() {
            // SAFETY: undo the configuration above.
            unsafe { gpio_reset_pin(gpio) };
            return Err(LineError::Busy(gpio));
        }
        info!("gpio: GPIO{} output", gpio);
        Ok(out)
    }

    fn acquire_input(&mut self, gpio: i32, polarity: EdgePolarity) -> Result<(), LineError> {
        self.check_free(gpio)?;
        // Pull toward the idle level so a floating line does not count.
        let (pull_up, pull_down, intr) = match polarity {
            EdgePolarity::Rising => (
                gpio_pullup_t_GPIO_PULLUP_DISABLE,
                gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
                gpio_int_type_t_GPIO_INTR_POSEDGE,
            ),
            EdgePolarity::Falling => (
                gpio_pullup_t_GPIO_PULLUP_ENABLE,
                gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
                gpio_int_type_t_GPIO_INTR_NEGEDGE,
            ),
        };
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << gpio,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: pull_up,
            pull_down_en: pull_down,
            intr_type: intr,
        };
        // SAFETY: as in `acquire_output`.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(LineError::ConfigFailed(ret));
        }
        if self.inputs.push((gpio, polarity)).is_err() {
            // SAFETY: undo the configuration above.
            unsafe { gpio_reset_pin(gpio) };
            return Err(LineError::Busy(gpio));
        }
        info!("gpio: GPIO{} input ({:?} edge)", gpio, polarity);
        Ok(())
    }

    fn register(&mut self, gpio: i32, sink: Box<dyn EdgeSink>) -> Result<(), LineError> {
        let polarity = self
            .inputs
            .iter()
            .find(|&&(g, _)| g == gpio)
            .map(|&(_, p)| p)
            .ok_or(LineError::RegisterFailed(ESP_ERR_INVALID_STATE))?;
        if self.slots.iter().any(|&(g, _)| g == gpio) || self.slots.is_full() {
            return Err(LineError::Busy(gpio));
        }
        self.install_isr_service()?;

        let raw = Box::into_raw(Box::new(IsrSlot {
            edge: polarity.edge(),
            sink,
        }));
        // SAFETY: `raw` stays valid until `detach` reclaims it.
        let ret = unsafe { gpio_isr_handler_add(gpio, Some(meter_gpio_isr), raw.cast()) };
        if ret != ESP_OK as i32 {
            // SAFETY: the handler was not installed, so we still own `raw`.
            drop(unsafe { Box::from_raw(raw) });
            return Err(LineError::RegisterFailed(ret));
        }
        // Cannot fail: capacity checked above.
        let _ = self.slots.push((gpio, raw));
        // SAFETY: handler installed; unmask the pin.
        unsafe { gpio_intr_enable(gpio) };
        info!("gpio: handler attached to GPIO{}", gpio);
        Ok(())
    }

    fn unregister(&mut self, gpio: i32) -> Option<Box<dyn EdgeSink>> {
        let slot = self.detach(gpio)?;
        info!("gpio: handler detached from GPIO{}", gpio);
        Some(slot.sink)
    }

    fn release_input(&mut self, gpio: i32) {
        if let Some(idx) = self.inputs.iter().position(|&(g, _)| g == gpio) {
            self.inputs.swap_remove(idx);
            // SAFETY: no handler is attached (callers unregister first).
            unsafe { gpio_reset_pin(gpio) };
        }
    }

    fn release_output(&mut self, gpio: i32) {
        if let Some(idx) = self.outputs.iter().position(|&g| g == gpio) {
            self.outputs.swap_remove(idx);
            // SAFETY: the `EspOutput` for this pin has been dropped.
            unsafe {
                gpio_set_level(gpio, 0);
                gpio_reset_pin(gpio);
            }
        }
    }
}

impl Drop for EspLines {
    fn drop(&mut self) {
        let attached: heapless::Vec<i32, MAX_LINES> =
            self.slots.iter().map(|&(g, _)| g).collect();
        for gpio in attached {
            warn!("gpio: GPIO{} handler still attached at drop", gpio);
            drop(self.detach(gpio));
        }
    }
}
