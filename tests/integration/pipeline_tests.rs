//! Acquisition → framing → filtering through the real serial source, plus
//! notification delivery and interlock policy at the loop level.

use std::collections::VecDeque;

use watertank::app::events::Stream;
use watertank::app::ports::Transport;
use watertank::app::service::WaterModule;
use watertank::config::LevelConfig;
use watertank::drivers::watchdog::SoftWatchdog;
use watertank::safety::SafetyState;
use watertank::sensors::SerialDistanceSource;

use crate::mock_hw::{RecordingOutputs, RecordingSink, Rig, ScriptedSource, quick_config};

/// UART that delivers queued chunks, one per read.
#[derive(Default)]
struct MockUart {
    rx: VecDeque<Vec<u8>>,
}

impl MockUart {
    fn queue(&mut self, bytes: &[u8]) {
        self.rx.push_back(bytes.to_vec());
    }
}

impl Transport for MockUart {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let Some(chunk) = self.rx.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }
}

// ── Serial path ───────────────────────────────────────────────

#[test]
fn serial_records_split_across_reads_reach_the_filter() {
    let mut module = WaterModule::new(quick_config(), 0);
    let mut uart = MockUart::default();
    uart.queue(b"12");
    uart.queue(b"0.0\r\n120");
    uart.queue(b".0\n");
    let mut source = SerialDistanceSource::new(uart);
    let (mut outputs, mut sink) = (RecordingOutputs::default(), RecordingSink::default());
    let mut wd = SoftWatchdog::new(2000, 0);

    for t in [0, 125, 250] {
        module.tick(t, &mut source, &mut outputs, &mut sink, &mut wd);
    }
    assert_eq!(module.frame_stats().records, 2);
    assert_eq!(module.estimator().ema(), Some(120.0));
    assert_eq!(module.estimator().last_valid_ms(), Some(250));
    assert!(!wd.expired(250));
}

#[test]
fn centimetre_records_are_scaled() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::bytes(b"12.5,cm\n"));
    rig.step();
    assert_eq!(rig.module.estimator().ema(), Some(125.0));
}

#[test]
fn flagged_invalid_frames_are_not_ingested() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::bytes(b"100,E\n100,E\n"));
    rig.step();
    assert_eq!(rig.module.frame_stats().records, 2);
    assert_eq!(rig.module.estimator().ema(), None);
    assert_eq!(rig.module.state(), SafetyState::Fault);
}

#[test]
fn garbage_is_counted_and_the_stream_recovers() {
    let bytes = b"abc\n\xff\xfe\n150.0\n";
    let mut rig = Rig::new(quick_config(), ScriptedSource::bytes(bytes));
    rig.step();
    let stats = rig.module.frame_stats();
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.records, 1);
    assert_eq!(rig.module.estimator().ema(), Some(150.0));
}

#[test]
fn out_of_range_readings_never_reach_the_estimate() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(10.0));
    rig.run_for(2000);
    assert_eq!(rig.module.estimator().ema(), None);
    assert!(rig.module.estimator().plausibility().outliers() >= 16);
    assert_eq!(rig.module.state(), SafetyState::Fault);
}

// ── Notifications ─────────────────────────────────────────────

#[test]
fn periodic_status_respects_interval() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.run_for(10_000);
    let status = rig.sink.status();
    // One at t=0, then every 2 s.
    assert_eq!(status.len(), 5);
    assert!(rig.module.notify_stats().coalesced > 0);
}

#[test]
fn failed_sends_do_not_burn_sequence_numbers() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.sink.fail_next = 2;
    rig.run_for(6000);
    let seqs: Vec<u64> = rig
        .sink
        .records
        .iter()
        .filter(|r| r.get("test_data_id").is_none())
        .filter_map(|r| r["seq"].as_u64())
        .collect();
    assert_eq!(seqs.first(), Some(&1));
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1), "{seqs:?}");
    assert_eq!(rig.module.seq(Stream::Status), *seqs.last().unwrap() as u32);
}

#[test]
fn disconnected_client_gets_backlog_on_reconnect() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.sink.connected = false;
    rig.run_for(1000);
    assert!(rig.sink.records.is_empty());

    rig.sink.connected = true;
    rig.step();
    let states = rig.sink.events("state");
    assert_eq!(states.len(), 1);
    assert_eq!(states[0]["state"], "OK");
    assert_eq!(states[0]["seq"], 1);
}

// ── Interlock policy at loop level ────────────────────────────

#[test]
fn pump_runs_at_low_but_heater_does_not() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(155.0)); // 25 %
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Low);
    let out = rig.outputs.current();
    assert!(out.master_allow && out.pump_allow);
    assert!(!out.heater_allow);
}

#[test]
fn bottom_stops_everything() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(185.0));
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Bottom);
    assert_eq!(rig.outputs.current(), watertank::interlock::InterlockOutputs::SAFE);
}

#[test]
fn disabled_interlock_holds_master_off_without_bench_override() {
    let config = LevelConfig {
        interlock_active: false,
        ..quick_config()
    };
    let mut rig = Rig::new(config, ScriptedSource::steady(80.0));
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Ok);
    assert!(!rig.outputs.ever_allowed());
}

#[test]
fn bench_override_forces_master_on() {
    let config = LevelConfig {
        interlock_active: false,
        bench_override: true,
        ..quick_config()
    };
    let mut rig = Rig::new(config, ScriptedSource::steady(185.0));
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Bottom);
    let out = rig.outputs.current();
    assert!(out.master_allow);
    assert!(!out.pump_allow && !out.heater_allow);
}

// ── Watchdog ──────────────────────────────────────────────────

#[test]
fn watchdog_is_fed_once_per_completed_iteration() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.run_for(1000);
    assert_eq!(rig.watchdog.feeds.len(), 8);
    assert_eq!(rig.watchdog.feeds, (0..8).map(|i| i * 125).collect::<Vec<u64>>());
}

#[test]
fn starved_soft_watchdog_trips() {
    let mut module = WaterModule::new(quick_config(), 0);
    let mut source = ScriptedSource::steady(80.0);
    let (mut outputs, mut sink) = (RecordingOutputs::default(), RecordingSink::default());
    let mut wd = SoftWatchdog::new(2000, 0);
    module.tick(0, &mut source, &mut outputs, &mut sink, &mut wd);
    assert!(!wd.expired(1999));
    // Loop stalls.
    assert!(wd.expired(2500));
    module.tick(2500, &mut source, &mut outputs, &mut sink, &mut wd);
    assert!(!wd.expired(2500));
}
