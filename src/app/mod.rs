//! Application core: port traits and the meter lifecycle.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`]; [`lifecycle`] wires the meter core to them, so this layer
//! is fully testable against the simulation adapters.

pub mod lifecycle;
pub mod ports;
