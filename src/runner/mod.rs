//! Run orchestration: load profiles, the run controller and health checks.
mod check;
mod controller;
mod engine;
mod profile;


pub use check::{HealthChecker, HealthVerdict};
pub use controller::{RunController, RunReport, RunState};
pub use profile::{LoadProfile, RunMode, RunSettings};
