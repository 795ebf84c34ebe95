mod app;
mod config;
mod configuration;
mod http;
mod metrics;
mod validation;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use config::ConfigFileError;
pub use configuration::ConfigurationError;
pub use http::HttpError;
pub use metrics::MetricsError;
pub use validation::ValidationError;
