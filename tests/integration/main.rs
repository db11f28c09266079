//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the meter end to end
//! against the simulation adapters (`SimLines` + `ManualClock`).  All tests
//! run on the host (x86_64) with no real hardware required.

#![cfg(not(target_os = "espidf"))]

mod concurrency_tests;
mod harness;
mod lifecycle_tests;
mod report_tests;
mod scenario_tests;
