use std::time::Duration;

use serde::Deserialize;

use crate::args::{Distribution, HttpMethod, OutputFormat, parse_duration_str};
use crate::error::ValidationError;

/// Values accepted in `loadsim.toml` / `loadsim.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub method: Option<HttpMethod>,
    pub url: Option<String>,
    pub urls: Option<Vec<String>>,
    pub headers: Option<Vec<String>>,
    pub data: Option<String>,
    pub content_type: Option<String>,
    pub timeout: Option<DurationValue>,
    pub connect_timeout: Option<DurationValue>,
    pub concurrency: Option<usize>,
    pub rate: Option<u64>,
    pub duration: Option<DurationValue>,
    pub distribution: Option<Distribution>,
    pub max_in_flight: Option<usize>,
    pub cancel_grace: Option<DurationValue>,
    pub latency_correction: Option<bool>,
    pub dynamic_body: Option<bool>,
    pub preflight: Option<bool>,
    pub output_format: Option<OutputFormat>,
    pub no_ua: Option<bool>,
}

/// Either whole seconds or a duration string such as `"250ms"`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, ValidationError> {
        match self {
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration_str(text),
        }
    }
}
