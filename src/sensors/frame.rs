//! Line-record frame accumulator for the ranging sensor stream.
//!
//! Wire format (ASCII, one record per line):
//! ```text
//! <distance>[,<unit>][,<flag>]\n
//!
//!   distance  decimal number
//!   unit      mm | cm         (case-insensitive, default mm)
//!   flag      V  | E          (E = sensor reports no echo)
//! ```
//!
//! The accumulator collects incoming bytes and yields complete records.
//! Partial reads are handled: a single transport read may carry half a
//! record, several records, or both. `\r` is ignored and blank lines are
//! skipped.
//!
//! The buffer is capped. When it fills without a terminator the oldest
//! byte is dropped, and the record that eventually completes is discarded
//! as malformed so a truncated front can never splice into a plausible
//! number.

use core::fmt::Write as _;

use heapless::{String, Vec};
use log::debug;

use crate::config::FRAME_BUFFER_CAP;
use crate::error::FrameError;

/// Length unit of the distance field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Mm,
    Cm,
}

impl Unit {
    fn parse(field: &str) -> Option<Self> {
        if field.eq_ignore_ascii_case("mm") {
            Some(Self::Mm)
        } else if field.eq_ignore_ascii_case("cm") {
            Some(Self::Cm)
        } else {
            None
        }
    }
}

/// A parsed distance record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFrame {
    /// Distance converted to millimetres.
    pub distance_mm: f32,
    pub unit: Unit,
    /// `false` when the sensor flagged the record as having no echo.
    pub valid: bool,
}

/// Running counters, never reset except by [`FrameAccumulator::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub records: u32,
    pub malformed: u32,
    pub overflows: u32,
    pub last_error: Option<FrameError>,
}

/// Streaming line-record accumulator.
pub struct FrameAccumulator {
    buf: Vec<u8, FRAME_BUFFER_CAP>,
    max_len: usize,
    /// Set when bytes were dropped from the front of the pending record.
    tainted: bool,
    stats: FrameStats,
}

impl FrameAccumulator {
    /// `max_len` is clamped to `1..=FRAME_BUFFER_CAP`.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len: max_len.clamp(1, FRAME_BUFFER_CAP),
            tainted: false,
            stats: FrameStats::default(),
        }
    }

    /// Feed a chunk of bytes; `on_frame` is called for each good record in
    /// stream order. Malformed records are counted and dropped.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(RawFrame)) {
        for &byte in data {
            match byte {
                b'\n' => {
                    if let Some(frame) = self.complete() {
                        on_frame(frame);
                    }
                }
                b'\r' => {}
                _ => self.push_byte(byte),
            }
        }
    }

    /// Drop any pending bytes (e.g. when the byte source changes).
    pub fn clear(&mut self) {
        self.buf.clear();
        self.tainted = false;
    }

    /// Change the buffer limit. Pending bytes beyond the new limit are
    /// dropped from the front.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len.clamp(1, FRAME_BUFFER_CAP);
        while self.buf.len() > self.max_len {
            self.buf.remove(0);
            self.tainted = true;
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = FrameStats::default();
    }

    // ── Internal ──────────────────────────────────────────────────

    fn push_byte(&mut self, byte: u8) {
        if self.buf.len() >= self.max_len {
            if !self.tainted {
                self.stats.overflows = self.stats.overflows.saturating_add(1);
                debug!("frame: buffer full at {} bytes, dropping oldest", self.max_len);
            }
            self.buf.remove(0);
            self.tainted = true;
        }
        // Cannot fail: length is below max_len <= capacity.
        let _ = self.buf.push(byte);
    }

    fn complete(&mut self) -> Option<RawFrame> {
        let result = if self.tainted {
            Some(Err(FrameError::Overflow))
        } else if self.buf.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(parse(&self.buf))
        };
        self.buf.clear();
        self.tainted = false;

        match result? {
            Ok(frame) => {
                self.stats.records = self.stats.records.saturating_add(1);
                Some(frame)
            }
            Err(e) => {
                self.stats.malformed = self.stats.malformed.saturating_add(1);
                self.stats.last_error = Some(e);
                debug!("frame: dropped record ({})", e);
                None
            }
        }
    }
}

/// Parse one record body (without terminator).
pub fn parse(line: &[u8]) -> Result<RawFrame, FrameError> {
    let text = core::str::from_utf8(line).map_err(|_| FrameError::NotUtf8)?;

    let mut fields = text.trim().split(',').map(str::trim);
    let distance = fields.next().unwrap_or("");
    let second = fields.next();
    let third = fields.next();
    if fields.next().is_some() {
        return Err(FrameError::FieldCount);
    }

    let value: f32 = distance.parse().map_err(|_| FrameError::NonNumeric)?;
    if !value.is_finite() {
        return Err(FrameError::NonNumeric);
    }

    let (unit, flag) = match (second, third) {
        (None, _) => (Unit::Mm, None),
        (Some(s), None) => match Unit::parse(s) {
            Some(unit) => (unit, None),
            // Two fields: the second may be a bare validity flag.
            None => (Unit::Mm, Some(parse_flag(s).ok_or(FrameError::BadUnit)?)),
        },
        (Some(s), Some(f)) => (
            Unit::parse(s).ok_or(FrameError::BadUnit)?,
            Some(parse_flag(f).ok_or(FrameError::BadFlag)?),
        ),
    };

    let distance_mm = match unit {
        Unit::Mm => value,
        Unit::Cm => value * 10.0,
    };

    Ok(RawFrame {
        distance_mm,
        unit,
        valid: flag.unwrap_or(true),
    })
}

fn parse_flag(field: &str) -> Option<bool> {
    match field {
        "V" | "v" => Some(true),
        "E" | "e" => Some(false),
        _ => None,
    }
}

/// Serialized record, as the sensor would emit it.
pub type Record = String<24>;

/// Format a distance in millimetres as a terminated record.
pub fn write_record(distance_mm: f32) -> Record {
    let mut out = Record::new();
    // Harness distances stay within a few thousand mm, far below 24 bytes.
    let _ = writeln!(out, "{:.1}", distance_mm);
    out
}
