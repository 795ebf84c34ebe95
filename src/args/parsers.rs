use std::path::Path;
use std::time::Duration;

use super::types::PositiveUsize;
use crate::error::{AppError, AppResult, HttpError, ValidationError};

pub(crate) fn parse_header(s: &str) -> Result<(String, String), ValidationError> {
    match s.split_once(':') {
        Some((key, value)) => {
            let key = key.trim();
            if key.is_empty() {
                return Err(ValidationError::HeaderNameEmpty {
                    value: s.to_owned(),
                });
            }
            Ok((key.to_owned(), value.trim().to_owned()))
        }
        None => Err(ValidationError::InvalidHeaderFormat {
            value: s.to_owned(),
        }),
    }
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

pub(super) fn parse_count<T>(s: &str) -> AppResult<T>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    s.trim()
        .parse::<T>()
        .map_err(|err| AppError::validation(ValidationError::InvalidNumber { source: err }))
}

/// Parse `<number>[ms|s|m|h]`; a bare number is seconds. Zero is allowed.
pub(crate) fn parse_duration_arg(s: &str) -> AppResult<Duration> {
    parse_duration_str(s).map_err(AppError::validation)
}

pub(crate) fn parse_duration_str(s: &str) -> Result<Duration, ValidationError> {
    let value = s.trim();
    if value.is_empty() {
        return Err(ValidationError::DurationEmpty);
    }

    let digits_len = value.chars().take_while(char::is_ascii_digit).count();
    if digits_len == 0 {
        return Err(ValidationError::InvalidDurationFormat {
            value: value.to_owned(),
        });
    }
    let (num_part, unit_part) = value.split_at(digits_len);
    let number: u64 =
        num_part
            .parse()
            .map_err(|err| ValidationError::InvalidDurationNumber {
                value: value.to_owned(),
                source: err,
            })?;

    let unit = if unit_part.is_empty() { "s" } else { unit_part };
    let duration = match unit {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => {
            let secs = number
                .checked_mul(60)
                .ok_or(ValidationError::DurationOverflow)?;
            Duration::from_secs(secs)
        }
        "h" => {
            let secs = number
                .checked_mul(60)
                .and_then(|seconds| seconds.checked_mul(60))
                .ok_or(ValidationError::DurationOverflow)?;
            Duration::from_secs(secs)
        }
        _ => {
            return Err(ValidationError::InvalidDurationUnit {
                unit: unit.to_owned(),
            });
        }
    };

    Ok(duration)
}

/// Split a comma separated URL list, dropping blanks.
pub(crate) fn parse_url_list(values: &[String]) -> Result<Vec<String>, ValidationError> {
    let urls: Vec<String> = values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
        .collect();
    if urls.is_empty() {
        return Err(ValidationError::UrlListEmpty);
    }
    Ok(urls)
}

/// Read one URL per line; blank lines and `#` comments are skipped.
pub(crate) fn read_url_file(path: &Path) -> AppResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        AppError::http(HttpError::ReadUrlFile {
            path: path.to_path_buf(),
            source,
        })
    })?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect();
    if urls.is_empty() {
        return Err(AppError::http(HttpError::UrlFileEmpty {
            path: path.to_path_buf(),
        }));
    }
    Ok(urls)
}
