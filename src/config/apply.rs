use std::time::Duration;

use crate::args::{Command, LoadsimArgs, PositiveUsize, RequestArgs, parse_header};
use crate::error::{AppError, AppResult, ConfigFileError};

use super::types::{ConfigFile, DurationValue};

/// Fill every option the command line left unset from the config file.
///
/// The command line always wins. Boolean switches are enabled if either
/// source enables them.
///
/// # Errors
///
/// Returns an error when a config value cannot be parsed.
pub fn apply_config(args: &mut LoadsimArgs, config: &ConfigFile) -> AppResult<()> {
    if args.output_format.is_none() {
        args.output_format = config.output_format;
    }

    match &mut args.command {
        Command::Burst(burst) => {
            fill(&mut burst.url, config.url.as_ref());
            fill(&mut burst.concurrency, config.concurrency.as_ref());
            apply_request(&mut burst.request, config)?;
        }
        Command::Rps(rps) => {
            fill(&mut rps.url, config.url.as_ref());
            fill(&mut rps.rate, config.rate.as_ref());
            if rps.duration.is_none() {
                rps.duration = duration_field(config.duration.as_ref(), "duration")?;
            }
            if rps.max_in_flight.is_none()
                && let Some(max) = config.max_in_flight
            {
                let max = PositiveUsize::try_from(max).map_err(|source| {
                    AppError::config_file(ConfigFileError::InvalidValue {
                        field: "max_in_flight",
                        source,
                    })
                })?;
                rps.max_in_flight = Some(max);
            }
            rps.latency_correction |= config.latency_correction.unwrap_or(false);
            apply_request(&mut rps.request, config)?;
        }
        Command::Multi(multi) => {
            if multi.urls.is_empty()
                && multi.url_file.is_none()
                && let Some(urls) = config.urls.as_ref()
            {
                multi.urls.clone_from(urls);
            }
            fill(&mut multi.concurrency, config.concurrency.as_ref());
            fill(&mut multi.distribution, config.distribution.as_ref());
            apply_request(&mut multi.request, config)?;
        }
        Command::Check(check) => {
            fill(&mut check.url, config.url.as_ref());
            apply_request(&mut check.request, config)?;
        }
    }
    Ok(())
}

fn apply_request(request: &mut RequestArgs, config: &ConfigFile) -> AppResult<()> {
    fill(&mut request.method, config.method.as_ref());
    fill(&mut request.data, config.data.as_ref());
    fill(&mut request.content_type, config.content_type.as_ref());

    if request.headers.is_empty()
        && let Some(headers) = config.headers.as_ref()
    {
        let mut parsed = Vec::with_capacity(headers.len());
        for header in headers {
            parsed.push(parse_header(header).map_err(|source| {
                AppError::config_file(ConfigFileError::InvalidHeader { source })
            })?);
        }
        request.headers = parsed;
    }

    if request.timeout.is_none() {
        request.timeout = duration_field(config.timeout.as_ref(), "timeout")?;
    }
    if request.connect_timeout.is_none() {
        request.connect_timeout =
            duration_field(config.connect_timeout.as_ref(), "connect_timeout")?;
    }
    if request.cancel_grace.is_none() {
        request.cancel_grace = duration_field(config.cancel_grace.as_ref(), "cancel_grace")?;
    }

    request.no_ua |= config.no_ua.unwrap_or(false);
    request.dynamic_body |= config.dynamic_body.unwrap_or(false);
    request.preflight |= config.preflight.unwrap_or(false);
    Ok(())
}

fn fill<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
    if slot.is_none() {
        *slot = value.cloned();
    }
}

fn duration_field(
    value: Option<&DurationValue>,
    field: &'static str,
) -> AppResult<Option<Duration>> {
    value
        .map(|value| {
            value.to_duration().map_err(|source| {
                AppError::config_file(ConfigFileError::InvalidDuration { field, source })
            })
        })
        .transpose()
}
