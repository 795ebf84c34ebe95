use bytes::Bytes;
use tracing::error;

use crate::args::defaults::{
    DEFAULT_CANCEL_GRACE, DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DURATION,
    DEFAULT_RATE, DEFAULT_TIMEOUT,
};
use crate::args::parsers::{parse_url_list, read_url_file};
use crate::args::{Command, HttpMethod, LoadsimArgs, MultiArgs, OutputFormat, PositiveUsize, RequestArgs};
use crate::error::{AppError, AppResult, ValidationError};
use crate::http::{ClientOptions, DEFAULT_USER_AGENT, RequestTemplate};
use crate::runner::{LoadProfile, RunSettings};

/// Everything needed to start one run, resolved from CLI and config.
#[derive(Debug)]
pub(crate) struct RunPlan {
    pub(crate) template: RequestTemplate,
    pub(crate) profile: LoadProfile,
    pub(crate) settings: RunSettings,
    pub(crate) client: ClientOptions,
    pub(crate) output_format: OutputFormat,
}

/// Resolve merged arguments into a run plan, applying built-in defaults.
///
/// # Errors
///
/// Returns an error when a required URL is missing, a URL source cannot be
/// read, or the request template is invalid.
pub(crate) fn build_plan(args: &LoadsimArgs) -> AppResult<RunPlan> {
    let request = args.command.request();
    let (urls, profile) = match &args.command {
        Command::Burst(burst) => (
            vec![required_url(burst.url.as_deref())?],
            LoadProfile::Burst {
                concurrency: burst.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            },
        ),
        Command::Rps(rps) => (
            vec![required_url(rps.url.as_deref())?],
            LoadProfile::Rps {
                rate: rps.rate.unwrap_or(DEFAULT_RATE),
                duration: rps.duration.unwrap_or(DEFAULT_DURATION),
            },
        ),
        Command::Multi(multi) => (
            multi_urls(multi)?,
            LoadProfile::Multi {
                concurrency: multi.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
                distribution: multi.distribution.unwrap_or_default(),
            },
        ),
        Command::Check(check) => (
            vec![required_url(check.url.as_deref())?],
            LoadProfile::Check,
        ),
    };

    let template = RequestTemplate::new(
        request.method.unwrap_or(HttpMethod::Get),
        urls,
        request_headers(request),
        request.data.clone().map(Bytes::from),
    )?
    .with_dynamic_body(request.dynamic_body);

    let (max_in_flight, latency_correction) = match &args.command {
        Command::Rps(rps) => (
            rps.max_in_flight.map(PositiveUsize::get),
            rps.latency_correction,
        ),
        Command::Burst(_) | Command::Multi(_) | Command::Check(_) => (None, false),
    };
    let settings = RunSettings {
        request_timeout: request.timeout.unwrap_or(DEFAULT_TIMEOUT),
        cancel_grace: request.cancel_grace.unwrap_or(DEFAULT_CANCEL_GRACE),
        max_in_flight,
        latency_correction,
        preflight: request.preflight,
    };

    let client = ClientOptions {
        connect_timeout: request.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        user_agent: (!request.no_ua).then(|| DEFAULT_USER_AGENT.to_owned()),
    };

    Ok(RunPlan {
        template,
        profile,
        settings,
        client,
        output_format: args.output_format.unwrap_or_default(),
    })
}

fn required_url(url: Option<&str>) -> AppResult<String> {
    url.map(str::to_owned).ok_or_else(|| {
        error!("Missing URL (set --url or provide in config).");
        AppError::validation(ValidationError::MissingUrl)
    })
}

fn multi_urls(multi: &MultiArgs) -> AppResult<Vec<String>> {
    if !multi.urls.is_empty() {
        return Ok(parse_url_list(&multi.urls)?);
    }
    match multi.url_file.as_deref() {
        Some(path) => read_url_file(path),
        None => Err(AppError::validation(ValidationError::MissingUrlList)),
    }
}

/// `-T` becomes an explicit Content-Type header ahead of any `-H` header.
fn request_headers(request: &RequestArgs) -> Vec<(String, String)> {
    request
        .content_type
        .iter()
        .map(|value| ("Content-Type".to_owned(), value.clone()))
        .chain(request.headers.iter().cloned())
        .collect()
}
