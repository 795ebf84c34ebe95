use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{HeaderName, HeaderValue};
use url::Url;

use super::rate::Dispatch;
use crate::args::HttpMethod;
use crate::error::ConfigurationError;

/// Immutable description of the request every dispatch sends.
///
/// Headers keep insertion order and may repeat. The body is passed through
/// as given; no `Content-Type` is ever added here.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: HttpMethod,
    urls: Vec<Arc<str>>,
    headers: Arc<[(String, String)]>,
    body: Option<Bytes>,
    dynamic_body: bool,
}

/// A template resolved for one dispatch.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub method: HttpMethod,
    pub url: Arc<str>,
    pub headers: Arc<[(String, String)]>,
    pub body: Option<Bytes>,
}

impl RequestTemplate {
    /// Validate and build a template.
    ///
    /// # Errors
    ///
    /// Returns an error when `urls` is empty, a URL is not an absolute
    /// http(s) URL with a host, or a header name or value is not valid HTTP.
    pub fn new(
        method: HttpMethod,
        urls: Vec<String>,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
    ) -> Result<Self, ConfigurationError> {
        if urls.is_empty() {
            return Err(ConfigurationError::EmptyUrlList);
        }
        let urls = urls
            .into_iter()
            .map(|url| validate_url(&url).map(|()| Arc::<str>::from(url.trim())))
            .collect::<Result<Vec<_>, _>>()?;
        for (name, value) in &headers {
            validate_header(name, value)?;
        }

        Ok(Self {
            method,
            urls,
            headers: Arc::from(headers),
            body,
            dynamic_body: false,
        })
    }

    /// Render `{{...}}` placeholders in the body for every dispatch.
    #[must_use]
    pub const fn with_dynamic_body(mut self, enabled: bool) -> Self {
        self.dynamic_body = enabled;
        self
    }

    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    #[must_use]
    pub fn urls(&self) -> &[Arc<str>] {
        &self.urls
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[must_use]
    pub const fn dynamic_body(&self) -> bool {
        self.dynamic_body
    }

    /// Resolve the template against one dispatch.
    #[must_use]
    pub fn resolve(&self, dispatch: &Dispatch) -> ResolvedRequest {
        let body = match self.body.as_ref() {
            Some(body) if self.dynamic_body => Some(render_body(body, dispatch.seq(), Utc::now())),
            other => other.cloned(),
        };
        ResolvedRequest {
            method: self.method,
            url: Arc::clone(dispatch.target()),
            headers: Arc::clone(&self.headers),
            body,
        }
    }
}

/// Accept only absolute http(s) URLs with a host.
///
/// # Errors
///
/// Returns an error describing why the URL was rejected.
pub fn validate_url(raw: &str) -> Result<(), ConfigurationError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|source| ConfigurationError::InvalidUrl {
        url: trimmed.to_owned(),
        source,
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ConfigurationError::UnsupportedScheme {
                url: trimmed.to_owned(),
                scheme: scheme.to_owned(),
            });
        }
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigurationError::UrlMissingHost {
            url: trimmed.to_owned(),
        }),
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), ConfigurationError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|source| {
        ConfigurationError::InvalidHeaderName {
            name: name.to_owned(),
            source,
        }
    })?;
    HeaderValue::from_str(value).map_err(|source| ConfigurationError::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })?;
    Ok(())
}

fn render_body(body: &Bytes, seq: u64, now: DateTime<Utc>) -> Bytes {
    let Ok(text) = std::str::from_utf8(body) else {
        return body.clone();
    };
    if !text.contains("{{") {
        return body.clone();
    }
    Bytes::from(render_template(text, &placeholder_vars(seq, now)))
}

pub(crate) fn placeholder_vars(seq: u64, now: DateTime<Utc>) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("seq".to_owned(), seq.to_string());
    vars.insert("userId".to_owned(), seq.saturating_add(1).to_string());
    vars.insert(
        "timestamp".to_owned(),
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    vars.insert("timestamp_ms".to_owned(), now.timestamp_millis().to_string());
    vars
}

/// Replace `{{key}}` with values from `vars`; unknown keys stay intact.
pub(crate) fn render_template(input: &str, vars: &BTreeMap<String, String>) -> String {
    let mut rest = input;
    let mut output = String::with_capacity(input.len());

    loop {
        let Some(start) = rest.find("{{") else {
            output.push_str(rest);
            break;
        };
        let (before, after_start) = rest.split_at(start);
        output.push_str(before);
        let Some(after) = after_start.strip_prefix("{{") else {
            output.push_str(after_start);
            break;
        };
        let Some(end) = after.find("}}") else {
            output.push_str("{{");
            output.push_str(after);
            break;
        };
        let (key_part, after_end) = after.split_at(end);
        match vars.get(key_part.trim()) {
            Some(value) => output.push_str(value),
            None => {
                output.push_str("{{");
                output.push_str(key_part);
                output.push_str("}}");
            }
        }
        rest = after_end.strip_prefix("}}").unwrap_or(after_end);
    }

    output
}
