use thiserror::Error;

/// Invalid load profile, request template or run settings.
///
/// Raised before any network activity takes place.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Concurrency must be >= 1.")]
    ZeroConcurrency,
    #[error("Rate must be >= 1 request per second.")]
    ZeroRate,
    #[error("URL list must not be empty.")]
    EmptyUrlList,
    #[error("{mode} mode targets a single URL, got {count}. Use multi mode for URL lists.")]
    TooManyUrls { mode: &'static str, count: usize },
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported scheme '{scheme}' in '{url}'. Only http and https are supported.")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("URL '{url}' is missing a host.")]
    UrlMissingHost { url: String },
    #[error("Invalid header name '{name}': {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("Invalid value for header '{name}': {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("Request timeout must be > 0.")]
    ZeroTimeout,
    #[error("Max in-flight must be >= 1.")]
    ZeroMaxInFlight,
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
}
