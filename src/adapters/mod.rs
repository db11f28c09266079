//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements        | Connects to                 |
//! |-----------------|-------------------|-----------------------------|
//! | `gpio`          | PulseLines        | ESP-IDF GPIO + ISR service  |
//! | `sim`           | PulseLines        | In-memory board (host)      |
//! |                 | ClockSource       | Hand-driven clock (host)    |
//! | `time`          | ClockSource       | System time + esp_timer     |
//! | `nvs`           | ConfigPort        | NVS / in-memory store       |
//! |                 | CountStore        |                             |
//! | `report_server` | (none)            | TCP listener (8-byte report)|

#[cfg(target_os = "espidf")]
pub mod gpio;
pub mod nvs;
pub mod report_server;
#[cfg(not(target_os = "espidf"))]
pub mod sim;
pub mod time;
