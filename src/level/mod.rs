//! Level estimation: plausibility gate, smoothing and calibration.
//!
//! ```text
//!   distance ──▶ PlausibilityFilter ──▶ SmoothingPipeline ──▶ Calibration ──▶ LevelEstimate
//!                    (range gate)         (median + EMA)        (anchors)
//! ```
//!
//! [`LevelEstimator`] owns all three stages and the "last valid reading"
//! timestamp that drives the timeout FAULT. It is touched only from the
//! control loop.

pub mod calibration;
pub mod plausibility;
pub mod smoothing;

use crate::config::LevelConfig;
use crate::error::CalibrationError;

use calibration::Calibration;
use plausibility::PlausibilityFilter;
use smoothing::SmoothingPipeline;

/// Result of one valid estimation cycle. Invalid cycles are reported as
/// [`InvalidReason`] instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEstimate {
    /// Fill percentage, 0–100.
    pub pct: f32,
    /// Smoothed distance.
    pub ema_mm: f32,
}

/// Why no valid estimate exists this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No accepted measurement since boot or the last filter reset.
    NoData,
    Calibration(CalibrationError),
}

pub struct LevelEstimator {
    plausibility: PlausibilityFilter,
    smoothing: SmoothingPipeline,
    calibration: Calibration,
    last_valid_ms: Option<u64>,
}

impl LevelEstimator {
    pub fn new(config: &LevelConfig) -> Self {
        Self {
            plausibility: PlausibilityFilter::new(),
            smoothing: SmoothingPipeline::new(config.window as usize, config.ema_alpha),
            calibration: Calibration::new(config.cal_full_mm, config.cal_empty_mm),
            last_valid_ms: None,
        }
    }

    /// Push one raw distance through the range gate and smoothing stages.
    /// Returns the new EMA if the reading was accepted.
    pub fn ingest(&mut self, distance_mm: f32, now_ms: u64, config: &LevelConfig) -> Option<f32> {
        let m = self
            .plausibility
            .accept(distance_mm, now_ms, config.min_mm, config.max_mm)?;
        let ema = self.smoothing.process(m.distance_mm);
        if config.cal_auto_learn {
            self.calibration.observe(ema);
        }
        self.last_valid_ms = Some(m.timestamp_ms);
        Some(ema)
    }

    /// Current estimate, or why there is none.
    pub fn estimate(&self, config: &LevelConfig) -> Result<LevelEstimate, InvalidReason> {
        let ema_mm = self.smoothing.ema().ok_or(InvalidReason::NoData)?;
        let pct = self
            .calibration
            .percent(ema_mm, config.cal_auto_learn)
            .map_err(InvalidReason::Calibration)?;
        Ok(LevelEstimate { pct, ema_mm })
    }

    /// A valid reading arrived within `timeout_ms` of `now_ms`.
    pub fn is_fresh(&self, now_ms: u64, timeout_ms: u32) -> bool {
        self.last_valid_ms
            .is_some_and(|t| now_ms.saturating_sub(t) <= u64::from(timeout_ms))
    }

    pub fn last_valid_ms(&self) -> Option<u64> {
        self.last_valid_ms
    }

    pub fn ema(&self) -> Option<f32> {
        self.smoothing.ema()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    pub fn plausibility(&self) -> &PlausibilityFilter {
        &self.plausibility
    }

    pub fn window_len(&self) -> usize {
        self.smoothing.window_len()
    }

    /// Pick up new filter settings and anchors from `config`.
    pub fn reconfigure(&mut self, config: &LevelConfig) {
        self.smoothing
            .reconfigure(config.window as usize, config.ema_alpha);
        self.calibration.full_mm = config.cal_full_mm;
        self.calibration.empty_mm = config.cal_empty_mm;
    }

    /// Drop smoothing state once the data has gone stale, so the first
    /// reading after a timeout seeds a fresh window and EMA. Returns true
    /// on the cycle that discards it.
    pub fn expire_stale(&mut self, now_ms: u64, timeout_ms: u32) -> bool {
        if self.is_fresh(now_ms, timeout_ms) || self.smoothing.ema().is_none() {
            return false;
        }
        self.smoothing.reset();
        true
    }

    /// Cold-start the filter: no EMA, no fresh reading.
    pub fn reset_filter(&mut self) {
        self.smoothing.reset();
        self.last_valid_ms = None;
    }
}
