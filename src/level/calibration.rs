//! Distance → fill percentage.
//!
//! Two anchors map the smoothed distance onto 0–100 %. The sensor looks
//! down, so the FULL anchor is the *shorter* distance:
//!
//! ```text
//!   pct = clamp(100 · (empty − ema) / (empty − full), 0, 100)
//! ```
//!
//! Missing anchors fall back to the auto-learned extremes (closest reading
//! stands in for FULL, farthest for EMPTY) when auto-learn is enabled.

use log::info;

use crate::error::CalibrationError;

/// Anchors closer together than this cannot resolve a percentage.
pub const MIN_SPAN_MM: f32 = 5.0;

/// Which anchor a `CAL` command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Full,
    Empty,
}

impl Anchor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Empty => "empty",
        }
    }
}

/// Observed extremes, saved across a test session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extrema {
    pub min_mm: Option<f32>,
    pub max_mm: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Calibration {
    pub full_mm: Option<f32>,
    pub empty_mm: Option<f32>,
    observed: Extrema,
}

impl Calibration {
    pub fn new(full_mm: Option<f32>, empty_mm: Option<f32>) -> Self {
        Self {
            full_mm,
            empty_mm,
            observed: Extrema::default(),
        }
    }

    /// Widen the observed range to include `ema_mm`. Never narrows.
    pub fn observe(&mut self, ema_mm: f32) {
        if !ema_mm.is_finite() {
            return;
        }
        self.observed.min_mm = Some(self.observed.min_mm.map_or(ema_mm, |m| m.min(ema_mm)));
        self.observed.max_mm = Some(self.observed.max_mm.map_or(ema_mm, |m| m.max(ema_mm)));
    }

    pub fn observed(&self) -> Extrema {
        self.observed
    }

    pub fn restore_observed(&mut self, extrema: Extrema) {
        self.observed = extrema;
    }

    /// Anchors in effect this cycle, with auto-learn fallback per anchor.
    pub fn effective(&self, auto_learn: bool) -> Result<(f32, f32), CalibrationError> {
        let full = self.full_mm.or(if auto_learn { self.observed.min_mm } else { None });
        let empty = self.empty_mm.or(if auto_learn { self.observed.max_mm } else { None });
        let (Some(full), Some(empty)) = (full, empty) else {
            return Err(CalibrationError::Missing);
        };
        if full > empty {
            return Err(CalibrationError::Inverted);
        }
        if empty - full < MIN_SPAN_MM {
            return Err(CalibrationError::SpanTooSmall);
        }
        Ok((full, empty))
    }

    /// Fill percentage for `ema_mm`, clamped to 0–100.
    pub fn percent(&self, ema_mm: f32, auto_learn: bool) -> Result<f32, CalibrationError> {
        let (full, empty) = self.effective(auto_learn)?;
        let pct = 100.0 * (empty - ema_mm) / (empty - full);
        Ok(pct.clamp(0.0, 100.0))
    }

    pub fn set(&mut self, anchor: Anchor, mm: f32) {
        match anchor {
            Anchor::Full => self.full_mm = Some(mm),
            Anchor::Empty => self.empty_mm = Some(mm),
        }
        info!("CAL | {} anchor set to {:.1} mm", anchor.as_str(), mm);
    }

    /// Unset both anchors. Observed extremes are kept.
    pub fn clear(&mut self) {
        self.full_mm = None;
        self.empty_mm = None;
        info!("CAL | anchors cleared");
    }
}
