//! Error types for the WaterTank firmware core.
//!
//! One small enum per subsystem. All variants are `Copy` so they can be
//! counted, logged and passed around without allocation.
//!
//! None of these are fatal: malformed frames and calibration problems are
//! recorded and resolve to the safe state, never to a panic.

use core::fmt;

// ---------------------------------------------------------------------------
// Frame errors
// ---------------------------------------------------------------------------

/// Why a record from the sensor stream was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Distance field is not a finite decimal number.
    NonNumeric,
    /// Unit field is neither `mm` nor `cm`.
    BadUnit,
    /// Validity flag is neither `V` nor `E`.
    BadFlag,
    /// More fields than the record grammar allows.
    FieldCount,
    /// Record followed a buffer overflow and may be spliced.
    Overflow,
    /// Record bytes are not valid UTF-8.
    NotUtf8,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonNumeric => write!(f, "non-numeric distance"),
            Self::BadUnit => write!(f, "unknown unit"),
            Self::BadFlag => write!(f, "unknown validity flag"),
            Self::FieldCount => write!(f, "wrong field count"),
            Self::Overflow => write!(f, "record truncated by overflow"),
            Self::NotUtf8 => write!(f, "record is not UTF-8"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// Neither an explicit anchor nor an auto-learned extreme is available.
    Missing,
    /// The full anchor is not closer to the sensor than the empty anchor.
    Inverted,
    /// Anchors are too close together to resolve a percentage.
    SpanTooSmall,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "anchors missing"),
            Self::Inverted => write!(f, "anchors inverted"),
            Self::SpanTooSmall => write!(f, "anchor span too small"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No remote peer is connected.
    NotConnected,
    /// The channel cannot accept data right now (backpressure).
    Busy,
    /// Generic I/O failure.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Busy => write!(f, "busy"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Line was blank after trimming.
    Empty,
    /// Line exceeds the command buffer.
    TooLong,
    /// Line does not name a known command.
    Unknown,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::TooLong => write!(f, "command too long"),
            Self::Unknown => write!(f, "unknown command"),
        }
    }
}
