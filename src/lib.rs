//! Water tank level monitor and fail-safe interlock firmware core.
//!
//! Turns raw ultrasonic distance readings into a fill percentage, a safety
//! state (OK / LOW / BOTTOM / FAULT) and three interlock permits (master,
//! pump, heater) that fail safe on any doubt. Everything here is pure logic
//! behind port traits, so the whole pipeline runs and is tested on the host.
//!
//! ```text
//!  UART bytes ─▶ sensors::frame ─▶ level (range gate, median, EMA, calibration)
//!                                     │
//!               harness (TEST) ───────┤
//!                                     ▼
//!                             safety ─▶ interlock ─▶ drivers::outputs
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod harness;
pub mod interlock;
pub mod level;
pub mod safety;
pub mod sensors;

pub use app::service::WaterModule;
pub use config::LevelConfig;
