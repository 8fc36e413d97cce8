//! Transport callback → control loop command queue.
//!
//! Uses an `embassy-sync` bounded channel to bridge the asynchronous
//! transport (BLE write callback, UART RX) with the synchronous control
//! loop. Producers only enqueue; the loop drains once per iteration, so a
//! command is never applied mid-cycle.
//!
//! ```text
//! ┌──────────────┐  Inbound   ┌──────────────┐
//! │  Transport   │───────────▶│ Control Loop │
//! │  callback    │  (depth 8) │  (drain/tick)│
//! └──────────────┘            └──────────────┘
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};
use log::warn;

use crate::error::CommandError;

use super::commands::MAX_COMMAND_LEN;

/// Channel depth for inbound messages.
pub const QUEUE_DEPTH: usize = 8;

/// One queued command line.
pub type CommandLine = String<MAX_COMMAND_LEN>;

/// Message from the transport side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(CommandLine),
    /// A line that could not be queued as text.
    Rejected(CommandError),
    /// The remote client went away.
    Disconnect,
}

/// Single-consumer inbound queue.
pub struct CommandQueue {
    channel: Channel<CriticalSectionRawMutex, Inbound, QUEUE_DEPTH>,
    dropped: AtomicU32,
    /// Set when a disconnect could not be queued; it must not be lost.
    disconnect_overflow: AtomicBool,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
            disconnect_overflow: AtomicBool::new(false),
        }
    }

    /// Enqueue a complete command line. Non-blocking; returns `false` when
    /// the queue is full and the line was dropped.
    pub fn push_line(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let msg = match CommandLine::try_from(trimmed) {
            Ok(text) => Inbound::Line(text),
            Err(()) => Inbound::Rejected(CommandError::TooLong),
        };
        self.push(msg)
    }

    /// Record a client disconnect. Never lost, even when the queue is full.
    pub fn push_disconnect(&self) {
        if self.channel.try_send(Inbound::Disconnect).is_err() {
            self.disconnect_overflow.store(true, Ordering::Release);
        }
    }

    pub(crate) fn push_rejected(&self, error: CommandError) -> bool {
        self.push(Inbound::Rejected(error))
    }

    /// Next message, in arrival order. An overflowed disconnect is
    /// delivered after everything that was queued.
    pub fn try_next(&self) -> Option<Inbound> {
        if let Ok(msg) = self.channel.try_receive() {
            return Some(msg);
        }
        self.disconnect_overflow
            .swap(false, Ordering::AcqRel)
            .then_some(Inbound::Disconnect)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty() && !self.disconnect_overflow.load(Ordering::Acquire)
    }

    /// Messages dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, msg: Inbound) -> bool {
        if self.channel.try_send(msg).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("command queue full, dropping message");
            false
        }
    }
}

/// Largest raw line the assembler buffers before declaring it overlong.
const LINE_CAP: usize = 64;

/// Frames a raw RX byte stream into command lines (`\n` or `\r`
/// terminated) for byte-oriented transports.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8, LINE_CAP>,
    overlong: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8], queue: &CommandQueue) {
        for &byte in data {
            if byte == b'\n' || byte == b'\r' {
                self.finish(queue);
            } else if self.buf.push(byte).is_err() {
                self.overlong = true;
            }
        }
    }

    fn finish(&mut self, queue: &CommandQueue) {
        if self.overlong {
            queue.push_rejected(CommandError::TooLong);
        } else if !self.buf.is_empty() {
            match core::str::from_utf8(&self.buf) {
                Ok(text) if !text.trim().is_empty() => {
                    queue.push_line(text);
                }
                Ok(_) => {}
                Err(_) => {
                    queue.push_rejected(CommandError::Unknown);
                }
            }
        }
        self.buf.clear();
        self.overlong = false;
    }
}
