//! End-to-end scenarios: the full control loop against mock hardware,
//! checking the committed safety state and the outputs it drives.

use watertank::config::LevelConfig;
use watertank::safety::SafetyState;

use crate::mock_hw::{PinCall, Rig, ScriptedSource, quick_config};

fn pct(rig: &Rig) -> f32 {
    rig.module.estimate().map(|e| e.pct).unwrap_or(f32::NAN)
}

/// Filter passes raw readings straight through.
fn unfiltered() -> LevelConfig {
    LevelConfig {
        window: 1,
        ema_alpha: 1.0,
        ..quick_config()
    }
}

// ── Tier hysteresis ───────────────────────────────────────────

#[test]
fn bottom_holds_until_band_is_cleared_then_rises_to_low() {
    // full=50, empty=190, bottom=10, low=30, hysteresis=4 (defaults)
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(190.0));
    rig.run_for(3000);
    assert_eq!(rig.module.state(), SafetyState::Bottom);
    assert!(pct(&rig) < 0.5);

    // 170 mm ≈ 14.3 %: just past bottom + hysteresis.
    rig.source.set_steady(170.0);
    let mut crossed_at = None;
    for _ in 0..80 {
        let t = rig.now();
        rig.step();
        let p = pct(&rig);
        if crossed_at.is_none() && p > 14.0 {
            crossed_at = Some(t);
        }
        match crossed_at {
            Some(c) if t >= c + 500 => {}
            _ => assert_eq!(
                rig.module.state(),
                SafetyState::Bottom,
                "left BOTTOM early at t={t} pct={p}"
            ),
        }
    }
    assert!(crossed_at.is_some(), "pct never cleared the band");
    assert_eq!(rig.module.state(), SafetyState::Low);
}

#[test]
fn bottom_never_releases_inside_the_band() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(190.0));
    rig.run_for(3000);
    assert_eq!(rig.module.state(), SafetyState::Bottom);

    // 172 mm ≈ 12.9 %: above bottom_pct, inside the dead band.
    rig.source.set_steady(172.0);
    for _ in 0..120 {
        rig.step();
        assert_eq!(rig.module.state(), SafetyState::Bottom);
    }
}

#[test]
fn low_needs_low_plus_hysteresis_to_return_to_ok() {
    let mut rig = Rig::new(unfiltered(), ScriptedSource::steady(155.0)); // 25 %
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Low);

    rig.source.set_steady(146.0); // ≈ 31.4 %, inside the band
    rig.run_for(3000);
    assert_eq!(rig.module.state(), SafetyState::Low);

    rig.source.set_steady(140.0); // ≈ 35.7 %
    rig.run_for(1000);
    assert_eq!(rig.module.state(), SafetyState::Ok);
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn excursion_shorter_than_debounce_is_discarded() {
    let mut rig = Rig::new(unfiltered(), ScriptedSource::steady(80.0));
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Ok);

    // 3 ticks × 125 ms = 375 ms of BOTTOM-level readings.
    rig.source.set_steady(185.0);
    for _ in 0..3 {
        rig.step();
    }
    rig.source.set_steady(80.0);
    for _ in 0..16 {
        rig.step();
        assert_eq!(rig.module.state(), SafetyState::Ok);
    }
    assert!(rig.sink.events("state").iter().all(|e| e["state"] != "BOTTOM"));
}

#[test]
fn excursion_longer_than_debounce_commits() {
    let mut rig = Rig::new(unfiltered(), ScriptedSource::steady(80.0));
    rig.run_for(2000);

    rig.source.set_steady(185.0);
    for _ in 0..5 {
        rig.step();
    }
    assert_eq!(rig.module.state(), SafetyState::Bottom);
    assert_eq!(rig.sink.last_event("state").unwrap()["state"], "BOTTOM");
}

// ── Timeout ───────────────────────────────────────────────────

#[test]
fn silence_past_timeout_faults_within_one_iteration() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Ok);

    let last_valid = rig.module.estimator().last_valid_ms().unwrap();
    let timeout = u64::from(rig.module.config().timeout_ms);
    rig.source.go_silent();
    while rig.now() <= last_valid + timeout {
        rig.step();
        assert_ne!(rig.module.state(), SafetyState::Fault);
    }
    rig.step();
    assert_eq!(rig.module.state(), SafetyState::Fault);
    assert_eq!(rig.module.applied_outputs(), watertank::interlock::InterlockOutputs::SAFE);
}

#[test]
fn timeout_overrides_a_pending_candidate() {
    let mut rig = Rig::new(unfiltered(), ScriptedSource::steady(80.0));
    rig.run_for(2000);

    // Start a LOW candidate, then lose the sensor before it can commit.
    rig.source.set_steady(165.0);
    rig.step();
    rig.source.go_silent();
    rig.run_for(1500);
    assert_eq!(rig.module.state(), SafetyState::Fault);
}

#[test]
fn sensor_recovery_leaves_fault_through_debounce() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.run_for(2000);
    rig.source.go_silent();
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Fault);

    rig.source.set_steady(80.0);
    rig.step();
    assert_eq!(rig.module.state(), SafetyState::Fault);
    rig.run_for(1000);
    assert_eq!(rig.module.state(), SafetyState::Ok);
}

#[test]
fn recovery_at_a_new_level_ignores_readings_from_before_the_timeout() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Ok);
    rig.source.go_silent();
    rig.run_for(2000);
    assert_eq!(rig.module.state(), SafetyState::Fault);
    assert_eq!(rig.module.estimator().ema(), None);

    // Tank drained while the sensor was out: 185 mm is ~3.6 %.
    rig.sink.clear();
    rig.outputs.calls.clear();
    rig.source.set_steady(185.0);
    rig.step();
    assert_eq!(rig.module.estimator().ema(), Some(185.0));
    rig.run_for(1000);

    assert_eq!(rig.module.state(), SafetyState::Bottom);
    let states = rig.sink.events("state");
    assert_eq!(states.len(), 1, "{states:?}");
    assert_eq!(states[0]["state"], "BOTTOM");
    assert!(!rig.outputs.ever_allowed());
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn outputs_stay_safe_through_boot_grace() {
    let mut rig = Rig::new(LevelConfig::default(), ScriptedSource::steady(80.0));
    rig.run_for(2900);
    assert!(!rig.module.ready());
    assert!(!rig.outputs.ever_allowed());
    assert_eq!(rig.module.state(), SafetyState::Fault);

    rig.run_for(1000);
    assert!(rig.module.ready());
    assert_eq!(rig.module.state(), SafetyState::Ok);
    let out = rig.outputs.current();
    assert!(out.master_allow && out.pump_allow && out.heater_allow);
}

#[test]
fn pin_failure_drives_everything_safe() {
    let mut rig = Rig::new(quick_config(), ScriptedSource::steady(80.0));
    rig.run_for(2000);
    assert!(rig.outputs.current().heater_allow);

    rig.outputs.fail_next = 1;
    rig.step();
    assert_eq!(rig.outputs.calls.last(), Some(&PinCall::DriveSafe));
    assert_eq!(rig.module.applied_outputs(), watertank::interlock::InterlockOutputs::SAFE);

    // Next iteration re-applies normally.
    rig.step();
    assert!(rig.outputs.current().heater_allow);
}
