//! Port traits: the hexagonal boundary between the level pipeline and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ WaterModule (domain)
//! ```
//!
//! Driven adapters (sensor UART, interlock pins, notification channel,
//! config storage, watchdog, clock) implement these traits. The
//! [`WaterModule`](super::service::WaterModule) consumes them via generics,
//! so the domain core never touches hardware directly.

use crate::config::LevelConfig;
use crate::error::TransportError;
use crate::interlock::InterlockOutputs;

// ───────────────────────────────────────────────────────────────
// Byte transport (driven adapter: sensor UART → domain)
// ───────────────────────────────────────────────────────────────

/// Byte-oriented, non-blocking channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data is available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;
}

// ───────────────────────────────────────────────────────────────
// Notification sink (driven adapter: domain → remote client)
// ───────────────────────────────────────────────────────────────

/// Outbound status/event channel. One call carries one complete record
/// (a single JSON object, no terminator).
///
/// Implementations must not block: a busy channel returns
/// [`TransportError::Busy`] and the caller retries on a later iteration.
pub trait NotificationSink {
    fn send(&mut self, record: &str) -> Result<(), TransportError>;

    /// Whether a remote client is attached. Records are held back while
    /// this is false.
    fn is_connected(&self) -> bool {
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Interlock outputs (driven adapter: domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// Applies the three interlock decisions to the physical boundary.
///
/// `true` always means "permitted to run"; electrical polarity is the
/// adapter's concern.
pub trait InterlockPort {
    /// Apply all three decisions together.
    fn apply(&mut self, outputs: InterlockOutputs) -> Result<(), ActuationError>;

    /// Drive every output to its stop level.
    fn drive_safe(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists module configuration.
///
/// `load` returns a sanitized config: out-of-range fields have already been
/// replaced by defaults.
pub trait ConfigPort {
    /// Returns [`LevelConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<LevelConfig, ConfigError>;

    fn save(&mut self, config: &LevelConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Watchdog & clock
// ───────────────────────────────────────────────────────────────

/// Liveness signal to the hardware watchdog.
pub trait WatchdogPort {
    /// Called once, at the end of every completed loop iteration.
    fn feed(&mut self, now_ms: u64);
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored blob failed deserialization.
    Corrupted,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`InterlockPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationError {
    /// A pin refused the requested level.
    Pin,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for ActuationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Pin => write!(f, "output pin error"),
        }
    }
}
