//! Mock hardware for integration tests.
//!
//! Records every interlock write and every outbound record so tests can
//! assert on the full history without real GPIO or a BLE client.

use std::collections::VecDeque;

use serde_json::Value;
use watertank::app::ports::{ActuationError, Clock, InterlockPort, NotificationSink, WatchdogPort};
use watertank::app::service::WaterModule;
use watertank::config::LevelConfig;
use watertank::error::TransportError;
use watertank::interlock::InterlockOutputs;
use watertank::sensors::{DistanceSource, SourceReading};

// ── Clock ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: u64,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

// ── Distance source ───────────────────────────────────────────

/// Plays back a script of readings, then repeats the fallback forever.
pub struct ScriptedSource {
    script: VecDeque<SourceReading>,
    pub fallback: SourceReading,
    pub polls: u32,
}

#[allow(dead_code)]
impl ScriptedSource {
    /// A sensor that reports `mm` on every poll.
    pub fn steady(mm: f32) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: SourceReading::Distance(mm),
            polls: 0,
        }
    }

    /// A sensor that has gone quiet.
    pub fn silent() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: SourceReading::Nothing,
            polls: 0,
        }
    }

    /// A UART that delivers `bytes` once, then nothing.
    pub fn bytes(bytes: &[u8]) -> Self {
        let mut s = Self::silent();
        for chunk in bytes.chunks(64) {
            let mut v = heapless::Vec::new();
            let _ = v.extend_from_slice(chunk);
            s.script.push_back(SourceReading::Bytes(v));
        }
        s
    }

    pub fn set_steady(&mut self, mm: f32) {
        self.script.clear();
        self.fallback = SourceReading::Distance(mm);
    }

    pub fn go_silent(&mut self) {
        self.script.clear();
        self.fallback = SourceReading::Nothing;
    }
}

impl DistanceSource for ScriptedSource {
    fn poll(&mut self, _now_ms: u64) -> SourceReading {
        self.polls += 1;
        self.script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

// ── Interlock pins ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinCall {
    Apply(InterlockOutputs),
    DriveSafe,
}

#[derive(Debug, Default)]
pub struct RecordingOutputs {
    pub calls: Vec<PinCall>,
    /// Fail the next N `apply` calls.
    pub fail_next: u32,
}

#[allow(dead_code)]
impl RecordingOutputs {
    /// Level currently on the pins.
    pub fn current(&self) -> InterlockOutputs {
        match self.calls.last() {
            Some(PinCall::Apply(o)) => *o,
            _ => InterlockOutputs::SAFE,
        }
    }

    pub fn ever_allowed(&self) -> bool {
        self.calls
            .iter()
            .any(|c| matches!(c, PinCall::Apply(o) if o.master_allow || o.pump_allow || o.heater_allow))
    }
}

impl InterlockPort for RecordingOutputs {
    fn apply(&mut self, outputs: InterlockOutputs) -> Result<(), ActuationError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(ActuationError::Pin);
        }
        self.calls.push(PinCall::Apply(outputs));
        Ok(())
    }

    fn drive_safe(&mut self) {
        self.calls.push(PinCall::DriveSafe);
    }
}

// ── Notification sink ─────────────────────────────────────────

#[derive(Debug)]
pub struct RecordingSink {
    pub records: Vec<Value>,
    pub connected: bool,
    pub fail_next: u32,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            connected: true,
            fail_next: 0,
        }
    }
}

#[allow(dead_code)]
impl RecordingSink {
    /// Records with `evt == name`.
    pub fn events(&self, name: &str) -> Vec<&Value> {
        self.records
            .iter()
            .filter(|r| r.get("evt").and_then(Value::as_str) == Some(name))
            .collect()
    }

    /// Periodic status records (no `evt`, has `state`).
    pub fn status(&self) -> Vec<&Value> {
        self.records
            .iter()
            .filter(|r| r.get("evt").is_none() && r.get("state").is_some())
            .collect()
    }

    pub fn last_event(&self, name: &str) -> Option<&Value> {
        self.events(name).into_iter().last()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl NotificationSink for RecordingSink {
    fn send(&mut self, record: &str) -> Result<(), TransportError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(TransportError::Busy);
        }
        let value = serde_json::from_str(record).map_err(|_| TransportError::Io)?;
        self.records.push(value);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ── Watchdog ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CountingWatchdog {
    pub feeds: Vec<u64>,
}

impl WatchdogPort for CountingWatchdog {
    fn feed(&mut self, now_ms: u64) {
        self.feeds.push(now_ms);
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Module plus every mock, stepped at the configured sample period.
pub struct Rig {
    pub module: WaterModule,
    pub clock: ManualClock,
    pub source: ScriptedSource,
    pub outputs: RecordingOutputs,
    pub sink: RecordingSink,
    pub watchdog: CountingWatchdog,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: LevelConfig, source: ScriptedSource) -> Self {
        Self {
            module: WaterModule::new(config, 0),
            clock: ManualClock::default(),
            source,
            outputs: RecordingOutputs::default(),
            sink: RecordingSink::default(),
            watchdog: CountingWatchdog::default(),
        }
    }

    pub fn period_ms(&self) -> u64 {
        u64::from(self.module.config().sample_period_ms())
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// One iteration at the current time, then advance one period.
    pub fn step(&mut self) {
        let now = self.clock.now_ms();
        self.module
            .tick(now, &mut self.source, &mut self.outputs, &mut self.sink, &mut self.watchdog);
        let period = self.period_ms();
        self.clock.advance(period);
    }

    /// Step until `ms` of simulated time have passed.
    pub fn run_for(&mut self, ms: u64) {
        let end = self.clock.now_ms() + ms;
        while self.clock.now_ms() < end {
            self.step();
        }
    }

    pub fn command(&mut self, line: &str) {
        assert!(self.module.commands().push_line(line), "command queue full");
    }

    /// Queue `line` and run one iteration so it takes effect.
    pub fn send(&mut self, line: &str) {
        self.command(line);
        self.step();
    }
}

/// Defaults with a short boot grace so tests settle quickly.
#[allow(dead_code)]
pub fn quick_config() -> LevelConfig {
    LevelConfig {
        boot_grace_s: 0,
        ..LevelConfig::default()
    }
}
