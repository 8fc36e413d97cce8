//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that drives the full control loop
//! against mock adapters. All tests run on the host with no real hardware
//! required.

mod harness_tests;
mod mock_hw;
mod pipeline_tests;
mod scenario_tests;
