use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use super::template::ResolvedRequest;
use crate::error::HttpError;
use crate::metrics::TransportErrorKind;

pub const DEFAULT_USER_AGENT: &str = concat!("loadsim/", env!("CARGO_PKG_VERSION"));

/// Response as seen by a worker once the body has been fully read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body_bytes: u64,
}

/// HTTP client collaborator. Must be safe to call from every worker at once.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportErrorKind>;
}

/// Client-wide settings for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: Some(DEFAULT_USER_AGENT.to_owned()),
        }
    }
}

/// [`HttpTransport`] over a shared `reqwest::Client` and its connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns an error when the underlying client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Self, HttpError> {
        let mut builder = Client::builder().connect_timeout(options.connect_timeout);
        if let Some(user_agent) = options.user_agent.as_deref() {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|source| HttpError::BuildClientFailed { source })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportErrorKind> {
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url.as_ref())
            .timeout(timeout);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|err| classify_error(&err))?;
        let status = response.status().as_u16();
        let body_bytes = drain_response_body(response)
            .await
            .map_err(|err| classify_error(&err))?;
        Ok(TransportResponse { status, body_bytes })
    }
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}

/// Map a client error onto the transport taxonomy.
///
/// Timeouts win over everything else. DNS and TLS failures surface from
/// reqwest as connect errors, so their source chain is inspected before
/// falling back to `Connect`.
pub(crate) fn classify_error(err: &reqwest::Error) -> TransportErrorKind {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        if source_mentions(err, DNS_MARKERS) {
            TransportErrorKind::Dns
        } else if source_mentions(err, TLS_MARKERS) {
            TransportErrorKind::Tls
        } else {
            TransportErrorKind::Connect
        }
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Other
    };
    debug!("Request failed ({}): {}", kind.as_str(), err);
    kind
}

const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
];
const TLS_MARKERS: &[&str] = &["certificate", "tls", "ssl", "handshake"];

/// Scan the error's sources. The top-level message is skipped because it
/// embeds the request URL.
fn source_mentions(err: &reqwest::Error, needles: &[&str]) -> bool {
    let mut current = err.source();
    while let Some(source) = current {
        let message = source.to_string().to_ascii_lowercase();
        if needles.iter().any(|needle| message.contains(needle)) {
            return true;
        }
        current = source.source();
    }
    false
}
