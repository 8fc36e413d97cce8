//! Interlock output pins (master, pump-ok, heater-ok).
//!
//! All three lines are active-low, energize-to-run: the pin is pulled LOW
//! to permit the load and driven HIGH to stop it. A floating or
//! de-energized line therefore reads as "stop".
//!
//! ## Safety contract
//!
//! - Construction drives every line to its stop level before anything else.
//! - If any pin write fails, all three lines are driven to stop and the
//!   error is reported; a partial update is never left standing.

use embedded_hal::digital::OutputPin;
use log::error;

use crate::app::ports::{ActuationError, InterlockPort};
use crate::interlock::InterlockOutputs;

pub struct ActiveLowOutputs<M, P, H> {
    master: M,
    pump: P,
    heater: H,
    applied: InterlockOutputs,
}

impl<M: OutputPin, P: OutputPin, H: OutputPin> ActiveLowOutputs<M, P, H> {
    pub fn new(master: M, pump: P, heater: H) -> Self {
        let mut outputs = Self {
            master,
            pump,
            heater,
            applied: InterlockOutputs::SAFE,
        };
        outputs.drive_safe();
        outputs
    }

    /// Last successfully applied decisions.
    pub fn applied(&self) -> InterlockOutputs {
        self.applied
    }

    /// Hand the pins back (board teardown, tests).
    pub fn release(self) -> (M, P, H) {
        (self.master, self.pump, self.heater)
    }

    fn write_all(&mut self, out: InterlockOutputs) -> Result<(), ActuationError> {
        level(&mut self.master, out.master_allow)?;
        level(&mut self.pump, out.pump_allow)?;
        level(&mut self.heater, out.heater_allow)?;
        Ok(())
    }
}

impl<M: OutputPin, P: OutputPin, H: OutputPin> InterlockPort for ActiveLowOutputs<M, P, H> {
    fn apply(&mut self, outputs: InterlockOutputs) -> Result<(), ActuationError> {
        match self.write_all(outputs) {
            Ok(()) => {
                self.applied = outputs;
                Ok(())
            }
            Err(e) => {
                error!("interlock pin write failed, forcing all outputs to stop");
                self.drive_safe();
                Err(e)
            }
        }
    }

    fn drive_safe(&mut self) {
        // Best effort on every line even if one fails.
        let m = self.master.set_high();
        let p = self.pump.set_high();
        let h = self.heater.set_high();
        if m.is_err() || p.is_err() || h.is_err() {
            error!("interlock: could not drive every line to stop");
        }
        self.applied = InterlockOutputs::SAFE;
    }
}

/// allow ⇒ LOW, disallow ⇒ HIGH.
fn level(pin: &mut impl OutputPin, allow: bool) -> Result<(), ActuationError> {
    let result = if allow { pin.set_low() } else { pin.set_high() };
    result.map_err(|_| ActuationError::Pin)
}
