//! Interlock output policy.
//!
//! A pure function of the committed safety state, readiness and the config
//! snapshot. Nothing here remembers previous outputs; all three decisions
//! are recomputed together every cycle and applied together.
//!
//! | State  | master | pump                  | heater |
//! |--------|--------|-----------------------|--------|
//! | OK     | yes    | yes                   | yes    |
//! | LOW    | yes    | if `allow_pump_at_low`| no     |
//! | BOTTOM | no     | no                    | no     |
//! | FAULT  | no     | no                    | no     |
//!
//! `true` always means "permitted to run".

use serde::Serialize;

use crate::config::LevelConfig;
use crate::safety::SafetyState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InterlockOutputs {
    pub master_allow: bool,
    pub pump_allow: bool,
    pub heater_allow: bool,
}

impl InterlockOutputs {
    /// Everything stopped.
    pub const SAFE: Self = Self {
        master_allow: false,
        pump_allow: false,
        heater_allow: false,
    };
}

/// Bench configuration that holds master on with the interlock disabled.
pub fn bench_override_active(config: &LevelConfig) -> bool {
    !config.interlock_active && config.bench_override
}

/// Derive all three outputs for this cycle.
pub fn derive(state: SafetyState, ready: bool, config: &LevelConfig) -> InterlockOutputs {
    if !ready {
        return InterlockOutputs::SAFE;
    }

    let master_allow = if config.interlock_active {
        !matches!(state, SafetyState::Fault | SafetyState::Bottom)
    } else {
        config.bench_override
    };

    let pump_state_ok = match state {
        SafetyState::Ok => true,
        SafetyState::Low => config.allow_pump_at_low,
        SafetyState::Bottom | SafetyState::Fault => false,
    };

    InterlockOutputs {
        master_allow,
        pump_allow: master_allow && pump_state_ok && config.use_pump_ok,
        heater_allow: master_allow && state == SafetyState::Ok && config.use_heater_ok,
    }
}
