//! Software watchdog.
//!
//! Host stand-in for the hardware task watchdog. The control loop feeds it
//! once at the end of every completed iteration; a supervisor (the board
//! loop, or a test) polls [`SoftWatchdog::expired`] and, on expiry, drives
//! the outputs to stop exactly as a hardware reset would.

use log::{error, info};

use crate::app::ports::WatchdogPort;

/// Default timeout, matching the module's hardware WDT.
pub const DEFAULT_TIMEOUT_MS: u32 = 2000;

pub struct SoftWatchdog {
    timeout_ms: u32,
    last_feed_ms: u64,
    feeds: u64,
    tripped: bool,
}

impl Default for SoftWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, 0)
    }
}

impl SoftWatchdog {
    /// Armed from `now_ms`.
    pub fn new(timeout_ms: u32, now_ms: u64) -> Self {
        info!("Watchdog(sim): armed, {} ms timeout", timeout_ms);
        Self {
            timeout_ms,
            last_feed_ms: now_ms,
            feeds: 0,
            tripped: false,
        }
    }

    /// `true` once the loop has gone `timeout_ms` without a feed. Latches
    /// until the next feed.
    pub fn expired(&mut self, now_ms: u64) -> bool {
        if !self.tripped && now_ms.saturating_sub(self.last_feed_ms) > u64::from(self.timeout_ms) {
            error!(
                "Watchdog(sim): no feed for {} ms, reset",
                now_ms.saturating_sub(self.last_feed_ms)
            );
            self.tripped = true;
        }
        self.tripped
    }

    pub fn feeds(&self) -> u64 {
        self.feeds
    }

    pub fn last_feed_ms(&self) -> u64 {
        self.last_feed_ms
    }
}

impl WatchdogPort for SoftWatchdog {
    fn feed(&mut self, now_ms: u64) {
        self.last_feed_ms = now_ms;
        self.feeds += 1;
        self.tripped = false;
    }
}
