//! Outbound records.
//!
//! The [`WaterModule`](super::service::WaterModule) hands these to the
//! [`Notifier`](super::notify::Notifier), which serializes each one to a
//! single JSON object and pushes it through the
//! [`NotificationSink`](super::ports::NotificationSink) port. Sequenced
//! records get a `seq` field at send time.

use heapless::String;
use serde::Serialize;

use crate::config::LevelConfig;
use crate::harness::{InjectionStats, Variant};
use crate::safety::SafetyState;

/// Sequence-numbered stream. Each counts independently from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Status,
    Test,
}

impl Stream {
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Status => 0,
            Self::Test => 1,
        }
    }
}

/// Periodic / `INFO?` status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusRecord {
    pub state: SafetyState,
    pub pct: Option<f32>,
    pub ema_mm: Option<f32>,
    pub obs_min: Option<f32>,
    pub obs_max: Option<f32>,
    pub ready: bool,
    pub test_active: bool,
}

/// Truncated echo of a rejected command line.
pub type EchoedCommand = String<24>;

/// Event records, tagged by `evt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "evt", rename_all = "snake_case")]
pub enum Event {
    /// Committed safety state change.
    State {
        state: SafetyState,
        pct: Option<f32>,
    },

    /// One synthetic sample's outcome.
    Test {
        test_data_id: u32,
        state: SafetyState,
        pct: Option<f32>,
        ema_mm: Option<f32>,
        mm: Option<f32>,
    },

    TestStarted {
        test_data_id: u32,
        variant: Variant,
        pipeline: bool,
        allow_outputs: bool,
    },

    /// Session end, with a resynchronization snapshot.
    TestStopped {
        test_data_id: u32,
        current_state: SafetyState,
        current_pct: Option<f32>,
    },

    /// `TEST?` reply.
    TestStatus {
        active: bool,
        test_data_id: u32,
        variant: Option<Variant>,
        injected: u32,
        dropped: u32,
        outliers: u32,
        corrupted: u32,
        skipped: u32,
    },

    /// Calibration acknowledgement.
    Cal {
        action: &'static str,
        ok: bool,
        mm: Option<f32>,
    },

    Sys {
        msg: &'static str,
    },

    #[serde(rename = "err")]
    Error {
        msg: &'static str,
        cmd: EchoedCommand,
    },
}

/// A record the notifier can send.
pub trait Notification: Serialize {
    /// Stream this record is numbered on; `None` for plain replies.
    fn stream(&self) -> Option<Stream>;
}

impl Notification for StatusRecord {
    fn stream(&self) -> Option<Stream> {
        Some(Stream::Status)
    }
}

/// `CFG?` reply.
impl Notification for LevelConfig {
    fn stream(&self) -> Option<Stream> {
        None
    }
}

impl Notification for Event {
    fn stream(&self) -> Option<Stream> {
        match self {
            Self::State { .. } => Some(Stream::Status),
            Self::Test { .. } | Self::TestStarted { .. } | Self::TestStopped { .. } => Some(Stream::Test),
            Self::TestStatus { .. } | Self::Cal { .. } | Self::Sys { .. } | Self::Error { .. } => None,
        }
    }
}

impl Event {
    pub fn test_status(active: bool, test_data_id: u32, variant: Option<Variant>, stats: InjectionStats) -> Self {
        Self::TestStatus {
            active,
            test_data_id,
            variant,
            injected: stats.injected,
            dropped: stats.dropped,
            outliers: stats.outliers,
            corrupted: stats.corrupted,
            skipped: stats.skipped,
        }
    }

    /// `err` record echoing (a prefix of) the offending line.
    pub fn unknown_command(line: &str) -> Self {
        let mut cmd = EchoedCommand::new();
        for c in line.trim().chars() {
            if cmd.push(c).is_err() {
                break;
            }
        }
        Self::Error {
            msg: "unknown_command",
            cmd,
        }
    }
}
