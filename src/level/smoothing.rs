//! Median + exponential smoothing.
//!
//! ```text
//!   accepted mm ──▶ MedianWindow(window) ──▶ Ema(alpha) ──▶ ema_mm
//! ```
//!
//! The median stage removes isolated spikes; the EMA removes the remaining
//! jitter. The EMA is seeded with the first median so a cold start has no
//! ramp from zero.

use heapless::Deque;

use crate::config::MAX_WINDOW;

const CAP: usize = MAX_WINDOW as usize;

/// Sliding window of the most recent accepted distances.
#[derive(Debug)]
pub struct MedianWindow {
    buf: Deque<f32, CAP>,
    window: usize,
}

impl MedianWindow {
    /// `window` is clamped to `1..=MAX_WINDOW`.
    pub fn new(window: usize) -> Self {
        Self {
            buf: Deque::new(),
            window: window.clamp(1, CAP),
        }
    }

    pub fn push(&mut self, value: f32) {
        while self.buf.len() >= self.window {
            self.buf.pop_front();
        }
        // Cannot fail: len < window <= capacity.
        let _ = self.buf.push_back(value);
    }

    /// Median of the buffered values; even sizes average the two central
    /// elements. `None` while empty.
    pub fn median(&self) -> Option<f32> {
        let n = self.buf.len();
        if n == 0 {
            return None;
        }
        let mut sorted = [0.0f32; CAP];
        for (slot, v) in sorted.iter_mut().zip(self.buf.iter()) {
            *slot = *v;
        }
        let sorted = &mut sorted[..n];
        sorted.sort_unstable_by(f32::total_cmp);
        if n % 2 == 1 {
            Some(sorted[n / 2])
        } else {
            Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
        }
    }

    /// Resize, keeping the newest samples.
    pub fn set_window(&mut self, window: usize) {
        self.window = window.clamp(1, CAP);
        while self.buf.len() > self.window {
            self.buf.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Exponential moving average, undefined until the first sample.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    value: Option<f32>,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        let next = match self.value {
            None => sample,
            Some(prev) => prev + self.alpha * (sample - prev),
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// The two stages chained; same code path for live and injected data.
#[derive(Debug)]
pub struct SmoothingPipeline {
    median: MedianWindow,
    ema: Ema,
}

impl SmoothingPipeline {
    pub fn new(window: usize, alpha: f32) -> Self {
        Self {
            median: MedianWindow::new(window),
            ema: Ema::new(alpha),
        }
    }

    /// Push one accepted distance and return the new EMA.
    pub fn process(&mut self, distance_mm: f32) -> f32 {
        self.median.push(distance_mm);
        // The window was just pushed, so it is never empty here.
        let med = self.median.median().unwrap_or(distance_mm);
        self.ema.update(med)
    }

    pub fn ema(&self) -> Option<f32> {
        self.ema.value()
    }

    pub fn median(&self) -> Option<f32> {
        self.median.median()
    }

    pub fn window_len(&self) -> usize {
        self.median.len()
    }

    /// Apply new window/alpha settings without discarding state.
    pub fn reconfigure(&mut self, window: usize, alpha: f32) {
        self.median.set_window(window);
        self.ema.set_alpha(alpha);
    }

    /// Cold start: empty window, EMA undefined.
    pub fn reset(&mut self) {
        self.median.clear();
        self.ema.reset();
    }
}
