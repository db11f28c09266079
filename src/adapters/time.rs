//! Wall-clock source for pulse timestamps.
//!
//! The wall clock is read once at construction and from then on advanced
//! by a monotonic counter, so readings never go backward even if the
//! system time is stepped (e.g. by SNTP).
//!
//! - **`target_os = "espidf"`**: monotonic part from `esp_timer_get_time()`
//!   (microseconds since boot, safe in ISR context).
//! - **`not(target_os = "espidf")`**: monotonic part from
//!   `std::time::Instant`.

use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::ports::ClockSource;
use crate::error::ClockError;
use crate::meter::time::Timestamp;

pub struct SystemClock {
    /// Wall-clock reading at monotonic zero.
    anchor: Timestamp,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl SystemClock {
    /// Anchor to the current system time.  Fails if the system time is
    /// before the UNIX epoch.
    pub fn new() -> Result<Self, ClockError> {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::Unavailable)?;

        #[cfg(target_os = "espidf")]
        {
            // esp_timer counts from boot; back-date the anchor by the
            // uptime so `now()` is anchor + uptime.
            let anchor = wall.saturating_sub(uptime());
            Ok(Self {
                anchor: Timestamp::from_duration(anchor),
            })
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(Self {
            anchor: Timestamp::from_duration(wall),
            start: std::time::Instant::now(),
        })
    }

    /// Monotonic time since the anchor's zero point.
    #[cfg(target_os = "espidf")]
    pub fn uptime(&self) -> Duration {
        uptime()
    }

    /// Monotonic time since the anchor's zero point.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(target_os = "espidf")]
fn uptime() -> Duration {
    // SAFETY: esp_timer_get_time is a read of the RTC-backed counter;
    // callable from ISR context.
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    Duration::from_micros(us.max(0) as u64)
}

impl ClockSource for SystemClock {
    fn now(&self) -> Result<Timestamp, ClockError> {
        Ok(self.anchor.saturating_add(self.uptime()))
    }
}
