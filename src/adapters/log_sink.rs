//! Log-based notification sink adapter.
//!
//! Implements [`NotificationSink`] by writing each outbound record to the
//! logger (UART / USB-CDC console on the module). Useful on the bench with
//! no remote client attached; a BLE adapter implements the same trait.

use log::info;

use crate::app::ports::NotificationSink;
use crate::error::TransportError;

/// Adapter that logs every outbound record.
#[derive(Debug, Default)]
pub struct LogNotificationSink {
    sent: u32,
}

impl LogNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written so far.
    pub fn sent(&self) -> u32 {
        self.sent
    }
}

impl NotificationSink for LogNotificationSink {
    fn send(&mut self, record: &str) -> Result<(), TransportError> {
        info!("NOTIFY | {}", record);
        self.sent = self.sent.wrapping_add(1);
        Ok(())
    }
}
