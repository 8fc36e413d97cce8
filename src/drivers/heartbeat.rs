//! Status LED heartbeat.
//!
//! Encodes the committed safety state as a blink rhythm on a single LED.
//! Every pattern repeats once per second, so the state is readable at a
//! glance without a display.
//!
//! | State            | Pattern                         |
//! |------------------|---------------------------------|
//! | OK               | one short blink (60 ms)         |
//! | LOW              | two quick blinks (80 / 120 ms)  |
//! | BOTTOM           | three quick blinks              |
//! | FAULT, not ready | long on (800 ms), short off     |

use embedded_hal::digital::OutputPin;

use crate::safety::SafetyState;

const PERIOD_MS: u64 = 1000;
const OK_ON_MS: u64 = 60;
const BLINK_ON_MS: u64 = 80;
const BLINK_SLOT_MS: u64 = 200;
const FAULT_ON_MS: u64 = 800;

/// LED level for `state` at `now_ms`. Pure function of its inputs.
pub fn led_on(state: SafetyState, ready: bool, now_ms: u64) -> bool {
    let phase = now_ms % PERIOD_MS;
    match (state, ready) {
        (SafetyState::Fault, _) | (_, false) => phase < FAULT_ON_MS,
        (SafetyState::Ok, true) => phase < OK_ON_MS,
        (SafetyState::Low, true) => blinks(phase, 2),
        (SafetyState::Bottom, true) => blinks(phase, 3),
    }
}

fn blinks(phase: u64, count: u64) -> bool {
    phase < count * BLINK_SLOT_MS && phase % BLINK_SLOT_MS < BLINK_ON_MS
}

/// Drives a status LED pin from the heartbeat pattern.
pub struct Heartbeat<L> {
    led: L,
    lit: Option<bool>,
}

impl<L: OutputPin> Heartbeat<L> {
    pub fn new(led: L) -> Self {
        Self { led, lit: None }
    }

    /// Update the LED; only writes the pin on a level change.
    pub fn tick(&mut self, state: SafetyState, ready: bool, now_ms: u64) {
        let on = led_on(state, ready, now_ms);
        if self.lit == Some(on) {
            return;
        }
        let result = if on { self.led.set_high() } else { self.led.set_low() };
        // A failed LED write is cosmetic; try again next tick.
        self.lit = result.is_ok().then_some(on);
    }

    pub fn is_lit(&self) -> bool {
        self.lit == Some(true)
    }
}
