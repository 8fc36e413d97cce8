//! Safety state machine.
//!
//! Runs once per control tick, after estimation and before the interlock
//! policy. It is the only writer of the committed [`SafetyState`].
//!
//! ## Tiers
//!
//! ```text
//!   100 % ┬──────────── OK
//!         │  low + h    ─┐ leave LOW upwards above this
//!         │  low        ─┘ enter LOW below this
//!         │  bottom + h ─┐ leave BOTTOM upwards above this
//!         │  bottom     ─┘ enter BOTTOM below this
//!     0 % ┴──────────── BOTTOM
//! ```
//!
//! ## Commit rules
//!
//! 1. FAULT is entered immediately, without debounce, when the reading has
//!    gone stale, when calibration makes the percentage undefined, or while
//!    the module is not yet ready.
//! 2. Any other tier must qualify continuously for `debounce_ms` before it
//!    is committed. A candidate that reverts earlier is discarded.
//! 3. FAULT is left only through rule 2.
//!
//! Boot starts in FAULT. The module becomes *ready* once `boot_grace_s`
//! has elapsed and a valid estimate is present; readiness is sticky.

use core::fmt;

use log::{info, warn};
use serde::Serialize;

use crate::config::LevelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyState {
    Ok,
    Low,
    Bottom,
    Fault,
}

impl SafetyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Low => "LOW",
            Self::Bottom => "BOTTOM",
            Self::Fault => "FAULT",
        }
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why FAULT was forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    /// Boot grace running or no valid estimate yet.
    NotReady,
    /// No valid reading within `timeout_ms`.
    Timeout,
    /// Fresh readings, but no usable percentage.
    Calibration,
    /// Requested by the caller (test session end).
    Forced,
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "not ready"),
            Self::Timeout => write!(f, "timeout"),
            Self::Calibration => write!(f, "calibration"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Per-cycle input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyInput {
    /// Fill percentage, `None` when the estimate is invalid.
    pub pct: Option<f32>,
    /// A valid reading arrived within `timeout_ms`.
    pub fresh: bool,
}

/// A committed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SafetyState,
    pub to: SafetyState,
}

pub struct SafetyStateMachine {
    state: SafetyState,
    last_transition_ms: u64,
    pending: Option<(SafetyState, u64)>,
    boot_ms: u64,
    ready: bool,
    last_cause: Option<FaultCause>,
}

impl SafetyStateMachine {
    pub fn new(boot_ms: u64) -> Self {
        Self {
            state: SafetyState::Fault,
            last_transition_ms: boot_ms,
            pending: None,
            boot_ms,
            ready: false,
            last_cause: Some(FaultCause::NotReady),
        }
    }

    /// Evaluate one cycle. Returns the transition if the committed state
    /// changed.
    pub fn update(&mut self, now_ms: u64, input: SafetyInput, config: &LevelConfig) -> Option<Transition> {
        let grace_over = now_ms.saturating_sub(self.boot_ms) >= u64::from(config.boot_grace_s) * 1000;

        let pct = match (input.fresh, input.pct) {
            (false, _) => Err(FaultCause::Timeout),
            (true, None) => Err(FaultCause::Calibration),
            (true, Some(p)) => Ok(p),
        };

        if !self.ready && grace_over && pct.is_ok() {
            self.ready = true;
            info!("SAFETY | ready");
        }

        let pct = match pct {
            Ok(p) if self.ready => p,
            Err(cause) if self.ready => return self.force(cause, now_ms),
            _ => return self.force(FaultCause::NotReady, now_ms),
        };

        self.last_cause = None;
        let candidate = tier(self.state, pct, config);
        if candidate == self.state {
            self.pending = None;
            return None;
        }

        let since = match self.pending {
            Some((p, since)) if p == candidate => since,
            _ => {
                self.pending = Some((candidate, now_ms));
                now_ms
            }
        };

        if now_ms.saturating_sub(since) >= u64::from(config.debounce_ms) {
            self.commit(candidate, now_ms)
        } else {
            None
        }
    }

    /// Enter FAULT immediately, discarding any pending candidate.
    pub fn force_fault(&mut self, now_ms: u64) -> Option<Transition> {
        self.force(FaultCause::Forced, now_ms)
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn pending(&self) -> Option<SafetyState> {
        self.pending.map(|(s, _)| s)
    }

    pub fn last_transition_ms(&self) -> u64 {
        self.last_transition_ms
    }

    /// Cause of the current FAULT, if the state was forced.
    pub fn fault_cause(&self) -> Option<FaultCause> {
        self.last_cause
    }

    // ── Internal ──────────────────────────────────────────────────

    fn force(&mut self, cause: FaultCause, now_ms: u64) -> Option<Transition> {
        self.pending = None;
        if self.last_cause != Some(cause) {
            warn!("SAFETY | FAULT forced: {cause}");
            self.last_cause = Some(cause);
        }
        if self.state == SafetyState::Fault {
            return None;
        }
        self.commit(SafetyState::Fault, now_ms)
    }

    fn commit(&mut self, to: SafetyState, now_ms: u64) -> Option<Transition> {
        let from = self.state;
        self.state = to;
        self.pending = None;
        self.last_transition_ms = now_ms;
        info!("SAFETY | {from} -> {to}");
        Some(Transition { from, to })
    }
}

/// Tier `pct` qualifies for, given the committed state.
fn tier(current: SafetyState, pct: f32, config: &LevelConfig) -> SafetyState {
    let bottom = config.bottom_pct;
    let low = config.low_pct;
    let h = config.hysteresis_pct;

    match current {
        SafetyState::Bottom => {
            if pct <= bottom + h {
                SafetyState::Bottom
            } else if pct <= low + h {
                SafetyState::Low
            } else {
                SafetyState::Ok
            }
        }
        SafetyState::Low => {
            if pct < bottom {
                SafetyState::Bottom
            } else if pct <= low + h {
                SafetyState::Low
            } else {
                SafetyState::Ok
            }
        }
        SafetyState::Ok | SafetyState::Fault => {
            if pct < bottom {
                SafetyState::Bottom
            } else if pct < low {
                SafetyState::Low
            } else {
                SafetyState::Ok
            }
        }
    }
}
