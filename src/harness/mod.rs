//! Fault-injection harness.
//!
//! Stands in for the distance source during a test session. Each tick it
//! produces a point on a triangle sweep across the plausible range and then
//! perturbs it, in this order:
//!
//! ```text
//!   jitter roll ─▶ dropout ─▶ noise ─▶ outlier ─▶ serialize ─▶ corrupt
//! ```
//!
//! A jitter hit holds the finished sample back for a later tick rather
//! than dropping it, so jitter moves data in time and dropout loses it.
//!
//! With the pipeline variant the sample leaves as record bytes and goes
//! through the same frame accumulator as the sensor UART; otherwise it
//! leaves as a decoded distance. Either way everything downstream of the
//! source is the live code path.

pub mod rng;

use heapless::{Deque, Vec};
use log::{info, warn};
use serde::Serialize;

use crate::config::LevelConfig;
use crate::level::calibration::Extrema;
use crate::sensors::frame::{Record, write_record};
use crate::sensors::{MAX_BURST, READ_CHUNK, SourceReading};

use rng::{XorShift32, session_seed};

/// `TEST START` flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Pipeline and output gating from the config.
    Config,
    /// Serialize through the frame accumulator, outputs withheld.
    Pipe,
    /// Serialize through the frame accumulator and drive the outputs.
    PipeOut,
}

impl Variant {
    /// `(pipeline, allow_outputs)` for this variant.
    pub fn resolve(self, config: &LevelConfig) -> (bool, bool) {
        match self {
            Self::Config => (config.test_pipeline, config.test_allow_outputs),
            Self::Pipe => (true, false),
            Self::PipeOut => (true, true),
        }
    }
}

/// Per-session counters reported by `TEST?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InjectionStats {
    pub injected: u32,
    pub dropped: u32,
    pub outliers: u32,
    pub corrupted: u32,
    pub skipped: u32,
}

/// State of the running session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u32,
    pub variant: Variant,
    pub pipeline: bool,
    pub allow_outputs: bool,
    pub started_ms: u64,
    /// Observed extremes at start, restored at stop.
    pub saved_extrema: Extrema,
}

/// Samples a jitter skip may hold back before skips stop being honoured.
pub const MAX_HELD: usize = 4;

/// Held samples plus the current one.
const BURST: usize = MAX_HELD + 1;

const _: () = assert!(BURST <= MAX_BURST);

/// One generated sample, in the form the session delivers it.
#[derive(Debug, Clone)]
enum Sample {
    Distance(f32),
    Record(Record),
}

/// Test injection state: generator, session bookkeeping and counters.
pub struct FaultInjector {
    session: Option<Session>,
    last_id: u32,
    rng: XorShift32,
    stats: InjectionStats,
    last_mm: Option<f32>,
    held: Deque<Sample, MAX_HELD>,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector {
    pub fn new() -> Self {
        Self {
            session: None,
            last_id: 0,
            rng: XorShift32::new(1),
            stats: InjectionStats::default(),
            last_mm: None,
            held: Deque::new(),
        }
    }

    /// Begin a session. A running session is replaced. Returns the new
    /// `test_data_id`.
    pub fn start(&mut self, now_ms: u64, variant: Variant, config: &LevelConfig, saved_extrema: Extrema) -> u32 {
        self.last_id = self.last_id.wrapping_add(1).max(1);
        let (pipeline, allow_outputs) = variant.resolve(config);
        self.rng = XorShift32::new(session_seed(config.test_seed, self.last_id));
        self.stats = InjectionStats::default();
        self.last_mm = None;
        self.held.clear();
        self.session = Some(Session {
            id: self.last_id,
            variant,
            pipeline,
            allow_outputs,
            started_ms: now_ms,
            saved_extrema,
        });

        info!(
            "TEST | session {} started (variant={:?}, pipeline={}, outputs={})",
            self.last_id, variant, pipeline, allow_outputs
        );
        if allow_outputs {
            warn!("TEST | session {} drives physical outputs from synthetic data", self.last_id);
        }
        self.last_id
    }

    /// End the session, handing back its state for cleanup.
    pub fn stop(&mut self) -> Option<Session> {
        let session = self.session.take()?;
        self.held.clear();
        info!("TEST | session {} stopped ({:?})", session.id, self.stats);
        Some(session)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Most recently issued `test_data_id` (0 before the first session).
    pub fn last_id(&self) -> u32 {
        self.last_id
    }

    pub fn stats(&self) -> InjectionStats {
        self.stats
    }

    /// Last distance handed downstream, before serialization.
    pub fn last_mm(&self) -> Option<f32> {
        self.last_mm
    }

    /// Produce this tick's synthetic input. `Nothing` when no session runs.
    ///
    /// A jitter skip holds the sample back instead of losing it; held
    /// samples go out ahead of the next delivered one, in order.
    pub fn poll(&mut self, now_ms: u64, config: &LevelConfig) -> SourceReading {
        let Some(session) = &self.session else {
            return SourceReading::Nothing;
        };
        let pipeline = session.pipeline;
        let elapsed = now_ms.saturating_sub(session.started_ms);

        let jitter = self.rng.chance(config.test_jitter_prob) && !self.held.is_full();
        let sample = self.generate(elapsed, pipeline, config);

        if jitter {
            self.stats.skipped = self.stats.skipped.saturating_add(1);
            if let Some(sample) = sample {
                // Room was checked above.
                let _ = self.held.push_back(sample);
            }
            return SourceReading::Nothing;
        }

        let mut burst: Vec<Sample, BURST> = Vec::new();
        while let Some(held) = self.held.pop_front() {
            let _ = burst.push(held);
        }
        if let Some(sample) = sample {
            let _ = burst.push(sample);
        }
        deliver(&burst)
    }

    /// Number of samples currently held back by jitter.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// One perturbed point of the sweep, or `None` if it was lost to
    /// dropout (or to corruption with no bytes to carry it).
    fn generate(&mut self, elapsed_ms: u64, pipeline: bool, config: &LevelConfig) -> Option<Sample> {
        if self.rng.chance(config.test_dropout_prob) {
            self.stats.dropped = self.stats.dropped.saturating_add(1);
            return None;
        }

        let mut mm = sweep_mm(elapsed_ms, config);
        if config.test_noise_mm > 0.0 {
            mm += self.rng.symmetric(config.test_noise_mm);
        }
        if self.rng.chance(config.test_outlier_prob) {
            self.stats.outliers = self.stats.outliers.saturating_add(1);
            mm = if self.rng.chance(0.5) {
                config.min_mm - 10.0 - self.rng.next_f32() * 20.0
            } else {
                config.max_mm + 50.0 + self.rng.next_f32() * 500.0
            };
        }

        self.stats.injected = self.stats.injected.saturating_add(1);
        self.last_mm = Some(mm);

        let corrupt = self.rng.chance(config.test_corrupt_prob);
        if corrupt {
            self.stats.corrupted = self.stats.corrupted.saturating_add(1);
        }
        if !pipeline {
            // No bytes to mangle; a corrupted direct sample is lost instead.
            return (!corrupt).then_some(Sample::Distance(mm));
        }

        let record = write_record(mm);
        Some(Sample::Record(if corrupt { self.corrupt(&record) } else { record }))
    }

    /// Insert `#` somewhere in the record body (never after the
    /// terminator), which no valid record contains.
    fn corrupt(&mut self, record: &Record) -> Record {
        let body = record.trim_end_matches('\n');
        let at = self.rng.below(body.len() + 1);
        let mut out = Record::new();
        let _ = out.push_str(&body[..at]);
        let _ = out.push('#');
        let _ = out.push_str(&body[at..]);
        let _ = out.push('\n');
        out
    }
}

/// Pack a burst into one reading: records share one chunk, distances
/// share one list.
fn deliver(burst: &[Sample]) -> SourceReading {
    match burst {
        [] => SourceReading::Nothing,
        [Sample::Distance(mm)] => SourceReading::Distance(*mm),
        _ => {
            let mut chunk: Vec<u8, READ_CHUNK> = Vec::new();
            let mut distances: Vec<f32, MAX_BURST> = Vec::new();
            for sample in burst {
                match sample {
                    // A burst of short records stays well under one chunk.
                    Sample::Record(r) => {
                        let _ = chunk.extend_from_slice(r.as_bytes());
                    }
                    Sample::Distance(mm) => {
                        let _ = distances.push(*mm);
                    }
                }
            }
            if distances.is_empty() {
                SourceReading::Bytes(chunk)
            } else {
                SourceReading::Distances(distances)
            }
        }
    }
}

/// Triangle sweep: `min_mm` (full) → `max_mm` (empty) over the first half
/// of the period, back over the second half.
pub fn sweep_mm(elapsed_ms: u64, config: &LevelConfig) -> f32 {
    let period_ms = u64::from(config.test_period_s.max(1)) * 1000;
    let ratio = (elapsed_ms % period_ms) as f32 / period_ms as f32;
    let span = config.max_mm - config.min_mm;
    if ratio < 0.5 {
        config.min_mm + (ratio / 0.5) * span
    } else {
        config.max_mm - ((ratio - 0.5) / 0.5) * span
    }
}
