//! Application service: the hexagonal core.
//!
//! [`WaterModule`] is the single context object that owns every piece of
//! pipeline state: frame accumulator, filter, calibration, safety state
//! machine, fault injector and notifier. All I/O flows through port traits
//! passed in at the call site, so the whole loop runs against mocks.
//!
//! ```text
//!  DistanceSource ──▶ ┌──────────────────────────────┐ ──▶ NotificationSink
//!                     │          WaterModule          │
//!   CommandQueue ───▶ │ frame · level · safety · TEST │ ──▶ InterlockPort
//!                     └──────────────────────────────┘ ──▶ WatchdogPort
//! ```
//!
//! One [`tick`](WaterModule::tick) is one control-loop iteration:
//!
//! 1. drain queued commands (applied between iterations, never mid-cycle)
//! 2. acquire from the live source or the fault injector
//! 3. frame, range-gate, smooth, calibrate
//! 4. update the safety state machine
//! 5. derive and apply interlock outputs (withheld during a test session
//!    unless the session allows them)
//! 6. schedule notifications
//! 7. feed the watchdog, last, so a hang anywhere above starves it

use heapless::Vec;
use log::{info, warn};

use crate::config::LevelConfig;
use crate::error::CommandError;
use crate::harness::{FaultInjector, Variant};
use crate::interlock::{self, InterlockOutputs};
use crate::level::calibration::Anchor;
use crate::level::{InvalidReason, LevelEstimate, LevelEstimator};
use crate::safety::{SafetyInput, SafetyState, SafetyStateMachine};
use crate::sensors::frame::{FrameAccumulator, FrameStats};
use crate::sensors::{DistanceSource, SourceReading};

use super::commands::Command;
use super::events::{Event, StatusRecord, Stream};
use super::notify::{Notifier, NotifyStats};
use super::ports::{ConfigPort, InterlockPort, NotificationSink, WatchdogPort};
use super::queue::{CommandQueue, Inbound, QUEUE_DEPTH};

/// Distances decoded from one tick's input (one 64-byte chunk holds at
/// most 32 records).
type Distances = Vec<f32, 32>;

// ───────────────────────────────────────────────────────────────
// WaterModule
// ───────────────────────────────────────────────────────────────

pub struct WaterModule {
    config: LevelConfig,
    frames: FrameAccumulator,
    estimator: LevelEstimator,
    safety: SafetyStateMachine,
    injector: FaultInjector,
    notifier: Notifier,
    commands: CommandQueue,
    estimate: Result<LevelEstimate, InvalidReason>,
    /// Policy output this cycle, before test gating.
    computed: InterlockOutputs,
    /// What the pins were last told.
    applied: InterlockOutputs,
    bench_warned: bool,
    config_dirty: bool,
    tick_count: u64,
}

impl WaterModule {
    /// Build the module from a (sanitized) config. Boots in FAULT with all
    /// outputs disallowed.
    pub fn new(config: LevelConfig, boot_ms: u64) -> Self {
        let (config, _) = config.sanitize();
        info!(
            "WaterModule: boot (window={}, alpha={}, range={}..{} mm, grace={} s)",
            config.window, config.ema_alpha, config.min_mm, config.max_mm, config.boot_grace_s
        );
        Self {
            frames: FrameAccumulator::new(usize::from(config.frame_buffer_max)),
            estimator: LevelEstimator::new(&config),
            safety: SafetyStateMachine::new(boot_ms),
            injector: FaultInjector::new(),
            notifier: Notifier::new(),
            commands: CommandQueue::new(),
            estimate: Err(InvalidReason::NoData),
            computed: InterlockOutputs::SAFE,
            applied: InterlockOutputs::SAFE,
            bench_warned: false,
            config_dirty: false,
            tick_count: 0,
            config,
        }
    }

    /// Inbound queue for transport callbacks.
    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control-loop iteration.
    pub fn tick(
        &mut self,
        now_ms: u64,
        source: &mut impl DistanceSource,
        outputs: &mut impl InterlockPort,
        sink: &mut impl NotificationSink,
        watchdog: &mut impl WatchdogPort,
    ) {
        self.tick_count = self.tick_count.saturating_add(1);

        // 1. Commands queued since the last iteration.
        self.drain_commands(now_ms);

        // 2. Acquisition. The live source is always polled so its bytes
        //    never pile up behind a test session.
        let live = source.poll(now_ms);
        let reading = if self.injector.is_active() {
            self.injector.poll(now_ms, &self.config)
        } else {
            live
        };

        // 3. Framing → plausibility → smoothing → calibration.
        //    Stale smoothing state is dropped on timeout so recovery is
        //    judged on resumed readings only.
        for mm in self.decode(&reading) {
            self.estimator.ingest(mm, now_ms, &self.config);
        }
        let fresh = self.estimator.is_fresh(now_ms, self.config.timeout_ms);
        if self.estimator.expire_stale(now_ms, self.config.timeout_ms) {
            warn!("sensor timeout: filter state discarded");
        }
        self.estimate = self.estimator.estimate(&self.config);

        // 4. Safety state.
        let input = SafetyInput {
            pct: self.estimate.ok().map(|e| e.pct),
            fresh,
        };
        if let Some(tr) = self.safety.update(now_ms, input, &self.config) {
            self.notifier.push(&Event::State {
                state: tr.to,
                pct: self.pct(),
            });
        }

        // 5. Interlocks.
        self.computed = interlock::derive(self.safety.state(), self.safety.ready(), &self.config);
        self.warn_on_bench_override();
        let gated = match self.injector.session() {
            Some(s) if !s.allow_outputs => InterlockOutputs::SAFE,
            _ => self.computed,
        };
        self.apply_outputs(gated, outputs);

        // 6. Notifications.
        self.notifier.offer(Stream::Status, &self.status_record());
        if let Some(session) = self.injector.session() {
            let sample = Event::Test {
                test_data_id: session.id,
                state: self.safety.state(),
                pct: self.pct(),
                ema_mm: self.estimator.ema(),
                mm: self.injector.last_mm(),
            };
            self.notifier.offer(Stream::Test, &sample);
        }
        self.notifier.flush(
            now_ms,
            self.config.status_interval_ms,
            self.config.notify_retry_limit,
            sink,
        );

        // 7. Completed iteration.
        watchdog.feed(now_ms);
    }

    // ── Command handling ──────────────────────────────────────

    fn drain_commands(&mut self, now_ms: u64) {
        // Bounded: anything arriving while we drain waits for next tick.
        for _ in 0..=QUEUE_DEPTH {
            let Some(msg) = self.commands.try_next() else {
                break;
            };
            match msg {
                Inbound::Line(line) => match Command::parse(&line) {
                    Ok(cmd) => self.handle_command(cmd, now_ms),
                    Err(CommandError::Empty) => {}
                    Err(e) => self.reject(e, &line),
                },
                Inbound::Rejected(e) => self.reject(e, ""),
                Inbound::Disconnect => {
                    info!("remote client disconnected");
                    if self.injector.is_active() {
                        self.stop_test(now_ms);
                    }
                }
            }
        }
    }

    /// Apply one decoded command. Also used directly by board code that
    /// has its own command source.
    pub fn handle_command(&mut self, cmd: Command, now_ms: u64) {
        match cmd {
            Command::Info => {
                let status = self.status_record();
                self.notifier.push(&status);
            }
            Command::ConfigDump => {
                self.notifier.push(&self.config);
            }
            Command::ConfigReset => {
                self.reload_config(LevelConfig::default());
                self.config_dirty = true;
                info!("Configuration reset to defaults");
                self.notifier.push(&Event::Sys { msg: "cfg_reset_ok" });
            }
            Command::Calibrate(anchor) => self.calibrate(anchor),
            Command::CalibrationClear => {
                self.estimator.calibration_mut().clear();
                self.config.cal_full_mm = None;
                self.config.cal_empty_mm = None;
                self.config_dirty = true;
                self.notifier.push(&Event::Cal {
                    action: "clear",
                    ok: true,
                    mm: None,
                });
            }
            Command::TestStart(variant) => self.start_test(variant, now_ms),
            Command::TestStop => {
                if !self.stop_test(now_ms) {
                    self.notifier.push(&Event::Sys { msg: "test_not_active" });
                }
            }
            Command::TestStatus => {
                let report = Event::test_status(
                    self.injector.is_active(),
                    self.injector.last_id(),
                    self.injector.session().map(|s| s.variant),
                    self.injector.stats(),
                );
                self.notifier.push(&report);
            }
        }
    }

    fn reject(&mut self, error: CommandError, line: &str) {
        warn!("command rejected ({}): {:?}", error, line);
        let event = match error {
            CommandError::TooLong => Event::Error {
                msg: "command_too_long",
                cmd: Default::default(),
            },
            CommandError::Empty | CommandError::Unknown => Event::unknown_command(line),
        };
        self.notifier.push(&event);
    }

    /// Set `anchor` to the current EMA. Refused without a usable EMA and
    /// during a test session.
    fn calibrate(&mut self, anchor: Anchor) {
        let ema = self.estimator.ema();
        let accepted = match ema {
            _ if self.injector.is_active() => {
                warn!("CAL {} refused: test session active", anchor.as_str());
                None
            }
            Some(v) if v.is_finite() && v >= self.config.min_mm && v <= self.config.max_mm => Some(v),
            _ => {
                warn!("CAL {} refused: no valid EMA ({:?})", anchor.as_str(), ema);
                None
            }
        };

        if let Some(mm) = accepted {
            self.estimator.calibration_mut().set(anchor, mm);
            match anchor {
                Anchor::Full => self.config.cal_full_mm = Some(mm),
                Anchor::Empty => self.config.cal_empty_mm = Some(mm),
            }
            self.config_dirty = true;
        }

        self.notifier.push(&Event::Cal {
            action: anchor.as_str(),
            ok: accepted.is_some(),
            mm: ema,
        });
    }

    fn start_test(&mut self, variant: Variant, now_ms: u64) {
        if self.injector.is_active() {
            self.stop_test(now_ms);
        }
        let saved = self.estimator.calibration().observed();
        let id = self.injector.start(now_ms, variant, &self.config, saved);
        // Partial live bytes must not prefix the first synthetic record.
        // The filter keeps running so synthetic silence times out exactly
        // like a real sensor going quiet.
        self.frames.clear();

        let session = self.injector.session().map(|s| (s.pipeline, s.allow_outputs));
        let (pipeline, allow_outputs) = session.unwrap_or((false, false));
        self.notifier.push(&Event::TestStarted {
            test_data_id: id,
            variant,
            pipeline,
            allow_outputs,
        });
    }

    /// End the running session and return the pipeline to live data with
    /// no synthetic state left behind. Returns `false` if none was running.
    fn stop_test(&mut self, now_ms: u64) -> bool {
        let Some(session) = self.injector.stop() else {
            return false;
        };
        self.estimator
            .calibration_mut()
            .restore_observed(session.saved_extrema);
        self.estimator.reset_filter();
        self.frames.clear();
        self.estimate = Err(InvalidReason::NoData);
        self.notifier.discard(Stream::Test);

        // Live data has to prove itself again through debounce.
        if let Some(tr) = self.safety.force_fault(now_ms) {
            self.notifier.push(&Event::State { state: tr.to, pct: None });
        }

        self.notifier.push(&Event::TestStopped {
            test_data_id: session.id,
            current_state: self.safety.state(),
            current_pct: self.pct(),
        });
        true
    }

    // ── Configuration ─────────────────────────────────────────

    /// Swap in a new config (sanitized first) between iterations.
    pub fn reload_config(&mut self, config: LevelConfig) {
        let (config, rejected) = config.sanitize();
        if rejected > 0 {
            warn!("config reload: {} field(s) fell back to defaults", rejected);
        }
        self.estimator.reconfigure(&config);
        self.frames.set_max_len(usize::from(config.frame_buffer_max));
        self.config = config;
    }

    /// Persist the config if a command changed it. A failed save is logged;
    /// the runtime change stays in effect. Returns `true` if saved.
    pub fn persist_if_dirty(&mut self, store: &mut impl ConfigPort) -> bool {
        if !self.config_dirty {
            return false;
        }
        self.config_dirty = false;
        match store.save(&self.config) {
            Ok(()) => {
                info!("Config saved");
                true
            }
            Err(e) => {
                warn!("Config save failed: {}", e);
                false
            }
        }
    }

    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn state(&self) -> SafetyState {
        self.safety.state()
    }

    pub fn ready(&self) -> bool {
        self.safety.ready()
    }

    pub fn estimate(&self) -> Result<LevelEstimate, InvalidReason> {
        self.estimate
    }

    /// Policy decision this cycle (before test gating).
    pub fn outputs(&self) -> InterlockOutputs {
        self.computed
    }

    /// Decision last handed to the pins.
    pub fn applied_outputs(&self) -> InterlockOutputs {
        self.applied
    }

    pub fn test_active(&self) -> bool {
        self.injector.is_active()
    }

    pub fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    pub fn estimator(&self) -> &LevelEstimator {
        &self.estimator
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.frames.stats()
    }

    pub fn notify_stats(&self) -> NotifyStats {
        self.notifier.stats()
    }

    pub fn seq(&self, stream: Stream) -> u32 {
        self.notifier.seq(stream)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn status_record(&self) -> StatusRecord {
        let observed = self.estimator.calibration().observed();
        StatusRecord {
            state: self.safety.state(),
            pct: self.pct(),
            ema_mm: self.estimator.ema(),
            obs_min: observed.min_mm,
            obs_max: observed.max_mm,
            ready: self.safety.ready(),
            test_active: self.injector.is_active(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn pct(&self) -> Option<f32> {
        self.estimate.ok().map(|e| e.pct)
    }

    /// Turn this tick's reading into plain distances. Frames the sensor
    /// flagged as invalid carry no reading.
    fn decode(&mut self, reading: &SourceReading) -> Distances {
        let mut out = Distances::new();
        match reading {
            SourceReading::Bytes(bytes) => {
                self.frames.feed(bytes, |frame| {
                    if frame.valid {
                        let _ = out.push(frame.distance_mm);
                    }
                });
            }
            SourceReading::Distance(mm) => {
                let _ = out.push(*mm);
            }
            SourceReading::Distances(list) => {
                let _ = out.extend_from_slice(list);
            }
            SourceReading::Nothing => {}
        }
        out
    }

    fn apply_outputs(&mut self, gated: InterlockOutputs, outputs: &mut impl InterlockPort) {
        match outputs.apply(gated) {
            Ok(()) => self.applied = gated,
            Err(e) => {
                warn!("interlock apply failed ({}), outputs forced safe", e);
                outputs.drive_safe();
                self.applied = InterlockOutputs::SAFE;
            }
        }
    }

    fn warn_on_bench_override(&mut self) {
        let active = interlock::bench_override_active(&self.config) && self.computed.master_allow;
        if active && !self.bench_warned {
            warn!("INTERLOCK | bench override: master held on with interlock disabled");
        }
        self.bench_warned = active;
    }
}
