use thiserror::Error;

use super::{ConfigFileError, ConfigurationError, HttpError, MetricsError, ValidationError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("CLI error: {source}")]
    Clap {
        #[from]
        source: clap::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Config file error: {0}")]
    ConfigFile(#[from] ConfigFileError),
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn configuration<E>(error: E) -> Self
    where
        E: Into<ConfigurationError>,
    {
        error.into().into()
    }

    pub fn validation<E>(error: E) -> Self
    where
        E: Into<ValidationError>,
    {
        error.into().into()
    }

    pub fn config_file<E>(error: E) -> Self
    where
        E: Into<ConfigFileError>,
    {
        error.into().into()
    }

    pub fn http<E>(error: E) -> Self
    where
        E: Into<HttpError>,
    {
        error.into().into()
    }

    pub fn metrics<E>(error: E) -> Self
    where
        E: Into<MetricsError>,
    {
        error.into().into()
    }

    /// Whether the error means the run was never started because its input
    /// was invalid.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, AppError::Configuration(_) | AppError::Validation(_))
    }
}
