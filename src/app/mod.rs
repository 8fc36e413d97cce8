//! Application core: pure domain logic, zero I/O.
//!
//! This module holds the command surface, the outbound records and the
//! [`service::WaterModule`] control loop. All interaction with hardware
//! happens through **port traits** defined in [`ports`], keeping this layer
//! fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod notify;
pub mod ports;
pub mod queue;
pub mod service;
