//! System configuration parameters
//!
//! All tunable parameters for the WaterTank module. Defaults match the
//! reference tank geometry (Domobar reservoir, DYP-A02YY ranging sensor).
//! Values are persisted by an external [`ConfigPort`](crate::app::ports::ConfigPort)
//! and referenced read-only by the control loop each cycle.
//!
//! Loading never aborts: a field that fails validation falls back to its
//! default and loading continues with the remaining fields.

use core::fmt::Debug;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest median window the filter can hold.
pub const MAX_WINDOW: u8 = 15;

/// Largest frame accumulator buffer (bytes).
pub const FRAME_BUFFER_CAP: usize = 64;

/// Log verbosity, as exposed over `CFG?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Err,
    Warn,
    Info,
}

impl LogLevel {
    /// Map onto the `log` facade's filter for `log::set_max_level`.
    pub fn filter(self) -> log::LevelFilter {
        match self {
            Self::Err => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
        }
    }
}

/// Core module configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    // --- Sampling & filtering ---
    /// Control loop / sensor sampling frequency (Hz).
    pub sample_hz: u32,
    /// Median filter window (samples).
    pub window: u8,
    /// EMA smoothing factor (0..1); higher tracks faster.
    pub ema_alpha: f32,

    // --- Plausibility ---
    /// Minimum plausible distance (sensor blind zone), mm.
    pub min_mm: f32,
    /// Maximum plausible distance (tank height + margin), mm.
    pub max_mm: f32,
    /// No valid reading for this long forces FAULT.
    pub timeout_ms: u32,

    // --- Level policy ---
    /// Below this fill percentage the tank is at the bottom.
    pub bottom_pct: f32,
    /// Below this fill percentage the tank is low.
    pub low_pct: f32,
    /// Dead band above each threshold before the tier is left again.
    pub hysteresis_pct: f32,
    /// Dwell time a candidate tier must hold before it is committed.
    pub debounce_ms: u32,
    /// Seconds after boot before outputs may be released.
    pub boot_grace_s: u32,

    // --- Interlocks ---
    /// Master interlock logic enabled.
    pub interlock_active: bool,
    /// Bench-only: force master allow while `interlock_active` is false.
    pub bench_override: bool,
    /// Pump permit output is wired and driven.
    pub use_pump_ok: bool,
    /// Heater permit output is wired and driven.
    pub use_heater_ok: bool,
    /// Pump may keep running in LOW (heater never does).
    pub allow_pump_at_low: bool,

    // --- Calibration ---
    /// Track observed extremes as a backstop for missing anchors.
    pub cal_auto_learn: bool,
    /// FULL anchor distance (mm); `None` when cleared.
    pub cal_full_mm: Option<f32>,
    /// EMPTY anchor distance (mm); `None` when cleared.
    pub cal_empty_mm: Option<f32>,

    // --- Transport ---
    /// Frame accumulator limit before the oldest bytes are discarded.
    pub frame_buffer_max: u16,
    /// Minimum spacing of periodic status records (ms).
    pub status_interval_ms: u32,
    /// Send attempts per outbound record before it is dropped.
    pub notify_retry_limit: u8,
    pub log_level: LogLevel,

    // --- Fault injection ---
    /// Period of one full synthetic sweep (seconds).
    pub test_period_s: u32,
    /// Uniform noise amplitude (± mm).
    pub test_noise_mm: f32,
    pub test_outlier_prob: f32,
    pub test_dropout_prob: f32,
    pub test_corrupt_prob: f32,
    /// Probability of skipping an injection tick entirely.
    pub test_jitter_prob: f32,
    /// Serialize synthetic samples through the frame accumulator.
    pub test_pipeline: bool,
    /// Apply computed outputs to the hardware during a test session.
    pub test_allow_outputs: bool,
    pub test_seed: u32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            // Sampling
            sample_hz: 8,
            window: 5,
            ema_alpha: 0.25,

            // Plausibility
            min_mm: 30.0,
            max_mm: 220.0,
            timeout_ms: 1200,

            // Level policy
            bottom_pct: 10.0,
            low_pct: 30.0,
            hysteresis_pct: 4.0,
            debounce_ms: 500,
            boot_grace_s: 3,

            // Interlocks
            interlock_active: true,
            bench_override: false,
            use_pump_ok: true,
            use_heater_ok: true,
            allow_pump_at_low: true,

            // Calibration
            cal_auto_learn: true,
            cal_full_mm: Some(50.0),
            cal_empty_mm: Some(190.0),

            // Transport
            frame_buffer_max: 48,
            status_interval_ms: 2000,
            notify_retry_limit: 3,
            log_level: LogLevel::Info,

            // Fault injection
            test_period_s: 20,
            test_noise_mm: 0.0,
            test_outlier_prob: 0.0,
            test_dropout_prob: 0.0,
            test_corrupt_prob: 0.0,
            test_jitter_prob: 0.0,
            test_pipeline: false,
            test_allow_outputs: false,
            test_seed: 0x5EED_1234,
        }
    }
}

impl LevelConfig {
    /// One control loop period in milliseconds (floored at 20 ms).
    pub fn sample_period_ms(&self) -> u32 {
        (1000 / self.sample_hz.max(1)).max(20)
    }

    /// Validate every field; rejected fields fall back to their default.
    ///
    /// Returns the repaired config and the number of fields replaced.
    pub fn sanitize(self) -> (Self, usize) {
        let d = Self::default();
        let mut c = self;
        let mut n = 0;

        fallback("sample_hz", (1..=50).contains(&c.sample_hz), &mut c.sample_hz, d.sample_hz, &mut n);
        fallback("window", (1..=MAX_WINDOW).contains(&c.window), &mut c.window, d.window, &mut n);
        fallback("ema_alpha", in_range(c.ema_alpha, 0.0, 1.0), &mut c.ema_alpha, d.ema_alpha, &mut n);
        fallback("min_mm", in_range(c.min_mm, 0.0, 10_000.0), &mut c.min_mm, d.min_mm, &mut n);
        fallback("max_mm", in_range(c.max_mm, 0.0, 10_000.0), &mut c.max_mm, d.max_mm, &mut n);
        if c.min_mm >= c.max_mm {
            warn!("config: min_mm {} >= max_mm {}, restoring both defaults", c.min_mm, c.max_mm);
            c.min_mm = d.min_mm;
            c.max_mm = d.max_mm;
            n += 2;
        }
        fallback("timeout_ms", (100..=60_000).contains(&c.timeout_ms), &mut c.timeout_ms, d.timeout_ms, &mut n);

        fallback("bottom_pct", in_range(c.bottom_pct, 0.0, 100.0), &mut c.bottom_pct, d.bottom_pct, &mut n);
        fallback("low_pct", in_range(c.low_pct, 0.0, 100.0), &mut c.low_pct, d.low_pct, &mut n);
        if c.bottom_pct >= c.low_pct {
            warn!("config: bottom_pct {} >= low_pct {}, restoring both defaults", c.bottom_pct, c.low_pct);
            c.bottom_pct = d.bottom_pct;
            c.low_pct = d.low_pct;
            n += 2;
        }
        fallback("hysteresis_pct", in_range(c.hysteresis_pct, 0.0, 25.0), &mut c.hysteresis_pct, d.hysteresis_pct, &mut n);
        if c.low_pct + c.hysteresis_pct >= 100.0 {
            // LOW could never be left.
            warn!(
                "config: low_pct {} + hysteresis_pct {} >= 100, restoring tier defaults",
                c.low_pct, c.hysteresis_pct
            );
            c.bottom_pct = d.bottom_pct;
            c.low_pct = d.low_pct;
            c.hysteresis_pct = d.hysteresis_pct;
            n += 3;
        }
        fallback("debounce_ms", c.debounce_ms <= 60_000, &mut c.debounce_ms, d.debounce_ms, &mut n);
        fallback("boot_grace_s", c.boot_grace_s <= 600, &mut c.boot_grace_s, d.boot_grace_s, &mut n);

        let (lo, hi) = (c.min_mm, c.max_mm);
        let anchor_ok = |a: Option<f32>| a.is_none_or(|v| in_range(v, lo, hi));
        fallback("cal_full_mm", anchor_ok(c.cal_full_mm), &mut c.cal_full_mm, d.cal_full_mm, &mut n);
        fallback("cal_empty_mm", anchor_ok(c.cal_empty_mm), &mut c.cal_empty_mm, d.cal_empty_mm, &mut n);

        fallback(
            "frame_buffer_max",
            (8..=FRAME_BUFFER_CAP as u16).contains(&c.frame_buffer_max),
            &mut c.frame_buffer_max,
            d.frame_buffer_max,
            &mut n,
        );
        fallback(
            "status_interval_ms",
            (100..=60_000).contains(&c.status_interval_ms),
            &mut c.status_interval_ms,
            d.status_interval_ms,
            &mut n,
        );
        fallback(
            "notify_retry_limit",
            (1..=10).contains(&c.notify_retry_limit),
            &mut c.notify_retry_limit,
            d.notify_retry_limit,
            &mut n,
        );

        fallback("test_period_s", (1..=3600).contains(&c.test_period_s), &mut c.test_period_s, d.test_period_s, &mut n);
        fallback("test_noise_mm", in_range(c.test_noise_mm, 0.0, 100.0), &mut c.test_noise_mm, d.test_noise_mm, &mut n);
        fallback("test_outlier_prob", is_prob(c.test_outlier_prob), &mut c.test_outlier_prob, d.test_outlier_prob, &mut n);
        fallback("test_dropout_prob", is_prob(c.test_dropout_prob), &mut c.test_dropout_prob, d.test_dropout_prob, &mut n);
        fallback("test_corrupt_prob", is_prob(c.test_corrupt_prob), &mut c.test_corrupt_prob, d.test_corrupt_prob, &mut n);
        fallback("test_jitter_prob", is_prob(c.test_jitter_prob), &mut c.test_jitter_prob, d.test_jitter_prob, &mut n);

        (c, n)
    }

    /// Merge a JSON object over the defaults, key by key, then sanitize.
    ///
    /// Unknown keys are ignored. A key whose value has the wrong type keeps
    /// its default. Text that is not a JSON object yields the defaults.
    pub fn from_json_lenient(text: &str) -> Self {
        let defaults = Self::default();
        let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
            return defaults;
        };

        let incoming: Map<String, Value> = match serde_json::from_str(text) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!("config: stored text is not a JSON object, using defaults");
                return defaults;
            }
        };

        for (key, value) in incoming {
            if !merged.contains_key(&key) {
                continue;
            }
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value.clone());
            if serde_json::from_value::<Self>(Value::Object(candidate)).is_ok() {
                merged.insert(key, value);
            } else {
                warn!("config: field '{}' has wrong type, using default", key);
            }
        }

        match serde_json::from_value::<Self>(Value::Object(merged)) {
            Ok(cfg) => cfg.sanitize().0,
            Err(_) => defaults,
        }
    }
}

fn in_range(v: f32, lo: f32, hi: f32) -> bool {
    v.is_finite() && v >= lo && v <= hi
}

fn is_prob(p: f32) -> bool {
    in_range(p, 0.0, 1.0)
}

fn fallback<T: Copy + Debug>(name: &str, ok: bool, field: &mut T, default: T, rejected: &mut usize) {
    if !ok {
        warn!("config: {} = {:?} rejected, using default {:?}", name, *field, default);
        *field = default;
        *rejected += 1;
    }
}
