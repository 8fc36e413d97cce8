//! Monotonic time adapter.
//!
//! The control loop and every timeout in the pipeline work in milliseconds
//! since boot. On the host this wraps `std::time::Instant`; tests use a
//! manually advanced clock instead.

use std::time::Instant;

use crate::app::ports::Clock;

pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since boot.
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        // u64 milliseconds outlast the hardware.
        self.start.elapsed().as_millis() as u64
    }
}
