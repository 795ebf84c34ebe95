//! Core library for the `loadsim` CLI.
//!
//! The engine turns a request template and a load profile into a stream of
//! HTTP requests and a frozen set of run statistics. It exposes the CLI
//! argument types, configuration loading, request execution and metrics
//! aggregation used by the binary; the primary user-facing interface is the
//! `loadsim` command-line application.
pub mod args;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod runner;
pub mod shutdown;
