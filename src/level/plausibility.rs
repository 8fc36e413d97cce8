//! Physical range gate ahead of the smoothing pipeline.
//!
//! The sensor's blind zone and maximum range bound what a real echo can
//! report. Anything outside `[min_mm, max_mm]` never reaches the median
//! window and never refreshes the "last valid reading" clock.

use log::debug;

/// A reading that passed the range gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub distance_mm: f32,
    pub timestamp_ms: u64,
}

#[derive(Debug, Default)]
pub struct PlausibilityFilter {
    accepted: u32,
    outliers: u32,
}

impl PlausibilityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `distance_mm` if it lies within `[min_mm, max_mm]`.
    pub fn accept(&mut self, distance_mm: f32, now_ms: u64, min_mm: f32, max_mm: f32) -> Option<Measurement> {
        if distance_mm.is_finite() && distance_mm >= min_mm && distance_mm <= max_mm {
            self.accepted = self.accepted.saturating_add(1);
            Some(Measurement {
                distance_mm,
                timestamp_ms: now_ms,
            })
        } else {
            self.outliers = self.outliers.saturating_add(1);
            debug!("plausibility: {} mm outside [{}, {}]", distance_mm, min_mm, max_mm);
            None
        }
    }

    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    pub fn outliers(&self) -> u32 {
        self.outliers
    }
}
