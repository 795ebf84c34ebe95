//! Glue between the command line and the run controller.
mod plan;
mod runner;
mod summary;


pub(crate) use plan::{RunPlan, build_plan};
pub(crate) use runner::run_local;
pub(crate) use summary::{exit_code, print_report};
