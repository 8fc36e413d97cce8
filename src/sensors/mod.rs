//! Distance acquisition: sources and framing.
//!
//! A [`DistanceSource`] is polled once per control tick. Byte-stream
//! sources hand raw chunks to the [`frame::FrameAccumulator`]; sources that
//! already produce numbers (bench rigs, test doubles) hand distances
//! straight to plausibility filtering.

pub mod frame;

use heapless::Vec;
use log::warn;

use crate::app::ports::Transport;

/// Largest chunk read from a source in one poll.
pub const READ_CHUNK: usize = 64;

/// Most decoded distances a source may hand over in one poll.
pub const MAX_BURST: usize = 8;

/// What a source produced this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceReading {
    /// Raw bytes for the frame accumulator.
    Bytes(Vec<u8, READ_CHUNK>),
    /// An already-decoded distance (mm).
    Distance(f32),
    /// Several decoded distances that arrived together, oldest first.
    Distances(Vec<f32, MAX_BURST>),
    /// Nothing arrived (timeout or idle line).
    Nothing,
}

/// A ranging sensor or equivalent producer of distance data.
pub trait DistanceSource {
    fn poll(&mut self, now_ms: u64) -> SourceReading;
}

/// Ultrasonic sensor on a UART: whatever bytes are waiting.
pub struct SerialDistanceSource<T: Transport> {
    transport: T,
    read_errors: u32,
}

impl<T: Transport> SerialDistanceSource<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            read_errors: 0,
        }
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport> DistanceSource for SerialDistanceSource<T> {
    fn poll(&mut self, _now_ms: u64) -> SourceReading {
        let mut buf = [0u8; READ_CHUNK];
        match self.transport.read(&mut buf) {
            Ok(0) => SourceReading::Nothing,
            Ok(n) => {
                let mut chunk = Vec::new();
                // n <= READ_CHUNK by the read contract; clamp anyway.
                let _ = chunk.extend_from_slice(&buf[..n.min(READ_CHUNK)]);
                SourceReading::Bytes(chunk)
            }
            Err(e) => {
                self.read_errors = self.read_errors.saturating_add(1);
                warn!("sensor UART read failed: {:?}", e);
                SourceReading::Nothing
            }
        }
    }
}
