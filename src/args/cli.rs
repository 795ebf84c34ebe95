use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use super::parsers::{parse_count, parse_duration_arg, parse_header, parse_positive_usize};
use super::types::{Distribution, HttpMethod, OutputFormat, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "loadsim",
    version,
    about = "HTTP load generator: bursts, sustained rates, multi-target runs and health probes."
)]
pub struct LoadsimArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML or JSON config file (defaults to ./loadsim.toml or ./loadsim.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (overridden by LOADSIM_LOG / RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Report format
    #[arg(long = "output-format", short = 'o', global = true, value_enum, ignore_case = true)]
    pub output_format: Option<OutputFormat>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Fire one wave of concurrent requests and wait for all of them
    Burst(BurstArgs),
    /// Sustain a fixed request rate for a duration
    Rps(RpsArgs),
    /// Spread one wave of concurrent requests over several URLs
    Multi(MultiArgs),
    /// Send a single probe request and report whether it succeeded
    Check(CheckArgs),
}

impl Command {
    #[must_use]
    pub const fn request(&self) -> &RequestArgs {
        match self {
            Command::Burst(args) => &args.request,
            Command::Rps(args) => &args.request,
            Command::Multi(args) => &args.request,
            Command::Check(args) => &args.request,
        }
    }
}

/// Request shaping flags shared by every mode.
#[derive(Debug, Args, Clone, Default)]
pub struct RequestArgs {
    /// HTTP method [default: get]
    #[arg(long, short = 'X', value_enum, ignore_case = true)]
    pub method: Option<HttpMethod>,

    /// HTTP headers in 'Key: Value' format (repeatable)
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body, sent verbatim
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Content-Type header (shortcut)
    #[arg(long = "content-type", short = 'T')]
    pub content_type: Option<String>,

    /// Per-request timeout (supports ms/s/m/h) [default: 30s]
    #[arg(long, value_parser = parse_duration_arg)]
    pub timeout: Option<Duration>,

    /// Connect timeout (supports ms/s/m/h) [default: 10s]
    #[arg(long = "connect-timeout", value_parser = parse_duration_arg)]
    pub connect_timeout: Option<Duration>,

    /// Do not send a User-Agent header
    #[arg(long = "no-ua")]
    pub no_ua: bool,

    /// Render {{userId}}, {{seq}}, {{timestamp}} and {{timestamp_ms}} in the body
    #[arg(long = "dynamic-body")]
    pub dynamic_body: bool,

    /// Time in-flight requests get to finish after Ctrl-C [default: 5s]
    #[arg(long = "cancel-grace", value_parser = parse_duration_arg)]
    pub cancel_grace: Option<Duration>,

    /// Probe the first target once before the run and abort if it fails
    #[arg(long)]
    pub preflight: bool,
}

#[derive(Debug, Args, Clone)]
pub struct BurstArgs {
    /// Target URL
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    /// Number of simultaneous requests [default: 20]
    #[arg(long, short = 'c', visible_alias = "users", value_parser = parse_count::<usize>)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(Debug, Args, Clone)]
pub struct RpsArgs {
    /// Target URL
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    /// Requests per second [default: 20]
    #[arg(long, short = 'r', value_parser = parse_count::<u64>)]
    pub rate: Option<u64>,

    /// Run duration (bare numbers are seconds) [default: 10s]
    #[arg(long, short = 't', value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Maximum requests on the wire at once [default: 2 x rate]
    #[arg(long = "max-in-flight", value_parser = parse_positive_usize)]
    pub max_in_flight: Option<PositiveUsize>,

    /// Measure latency from the scheduled send time (includes queueing delay)
    #[arg(long = "latency-correction")]
    pub latency_correction: bool,

    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(Debug, Args, Clone)]
pub struct MultiArgs {
    /// Comma separated target URLs
    #[arg(long, short = 'L', value_delimiter = ',', conflicts_with = "url_file")]
    pub urls: Vec<String>,

    /// File with one URL per line (# starts a comment)
    #[arg(long = "url-file", short = 'f')]
    pub url_file: Option<PathBuf>,

    /// Number of simultaneous requests [default: 20]
    #[arg(long, short = 'c', visible_alias = "users", value_parser = parse_count::<usize>)]
    pub concurrency: Option<usize>,

    /// How each request picks its target [default: round-robin]
    #[arg(long, value_enum, ignore_case = true)]
    pub distribution: Option<Distribution>,

    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Target URL
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    #[command(flatten)]
    pub request: RequestArgs,
}
