//! CLI argument types and parsing helpers.
mod cli;
pub(crate) mod defaults;
pub(crate) mod parsers;
mod types;


pub use cli::{BurstArgs, CheckArgs, Command, LoadsimArgs, MultiArgs, RequestArgs, RpsArgs};
pub use types::{Distribution, HttpMethod, OutputFormat, PositiveUsize};

pub(crate) use parsers::{parse_duration_arg, parse_duration_str, parse_header};
