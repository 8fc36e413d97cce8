//! Inbound commands to the water module.
//!
//! Text lines arrive over the remote channel and are decoded by a strict
//! parser into [`Command`]. Matching is case-insensitive after trimming;
//! internal whitespace runs collapse to one space.
//!
//! | Line                  | Command                          |
//! |-----------------------|----------------------------------|
//! | `INFO?`               | [`Command::Info`]                |
//! | `CFG?`                | [`Command::ConfigDump`]          |
//! | `CFG RESET`           | [`Command::ConfigReset`]         |
//! | `CAL FULL` / `EMPTY`  | [`Command::Calibrate`]           |
//! | `CAL CLEAR`           | [`Command::CalibrationClear`]    |
//! | `TEST START[/ PIPE [OUT]]` | [`Command::TestStart`]      |
//! | `TEST STOP`           | [`Command::TestStop`]            |
//! | `TEST?`               | [`Command::TestStatus`]          |

use heapless::String;

use crate::error::CommandError;
use crate::harness::Variant;
use crate::level::calibration::Anchor;

/// Longest accepted command line.
pub const MAX_COMMAND_LEN: usize = 48;

/// Commands that the remote client can send into the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Status snapshot.
    Info,
    /// Full configuration dump.
    ConfigDump,
    /// Restore defaults and persist them.
    ConfigReset,
    /// Set an anchor to the current EMA.
    Calibrate(Anchor),
    /// Unset both anchors.
    CalibrationClear,
    TestStart(Variant),
    TestStop,
    TestStatus,
}

impl Command {
    /// Decode one line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        if line.len() > MAX_COMMAND_LEN {
            return Err(CommandError::TooLong);
        }

        // Normalise: upper-case, '/' as a word break, single spaces.
        let mut norm: String<MAX_COMMAND_LEN> = String::new();
        for word in line
            .split(|c: char| c.is_ascii_whitespace() || c == '/')
            .filter(|w| !w.is_empty())
        {
            if !norm.is_empty() {
                norm.push(' ').map_err(|()| CommandError::TooLong)?;
            }
            for c in word.chars() {
                norm.push(c.to_ascii_uppercase())
                    .map_err(|()| CommandError::TooLong)?;
            }
        }

        match norm.as_str() {
            "INFO?" => Ok(Self::Info),
            "CFG?" => Ok(Self::ConfigDump),
            "CFG RESET" => Ok(Self::ConfigReset),
            "CAL FULL" => Ok(Self::Calibrate(Anchor::Full)),
            "CAL EMPTY" => Ok(Self::Calibrate(Anchor::Empty)),
            "CAL CLEAR" => Ok(Self::CalibrationClear),
            "TEST START" => Ok(Self::TestStart(Variant::Config)),
            "TEST START PIPE" => Ok(Self::TestStart(Variant::Pipe)),
            "TEST START PIPE OUT" => Ok(Self::TestStart(Variant::PipeOut)),
            "TEST STOP" => Ok(Self::TestStop),
            "TEST?" => Ok(Self::TestStatus),
            _ => Err(CommandError::Unknown),
        }
    }
}
