//! GPIO-level drivers: interlock outputs, status LED heartbeat, watchdog.

pub mod heartbeat;
pub mod outputs;
pub mod watchdog;
