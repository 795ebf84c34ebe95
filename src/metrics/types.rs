use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// First status code classified as an HTTP error.
pub const HTTP_ERROR_STATUS_FLOOR: u16 = 400;

/// Transport-level failure class of a request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Timeout,
    /// The response started but its body could not be read to the end.
    Body,
    /// The run was cancelled before the request finished.
    Cancelled,
    Other,
}

impl TransportErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Other => "other",
        }
    }
}

/// Classification of a finished request attempt.
///
/// Any status below 400 (including redirects the client did not follow) is a
/// success; 400 and above is an HTTP error. Both count as completed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeResult {
    Success { status_code: u16 },
    HttpError { status_code: u16 },
    TransportError { kind: TransportErrorKind },
}

impl OutcomeResult {
    #[must_use]
    pub const fn from_status(status_code: u16) -> Self {
        if status_code >= HTTP_ERROR_STATUS_FLOOR {
            OutcomeResult::HttpError { status_code }
        } else {
            OutcomeResult::Success { status_code }
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            OutcomeResult::Success { status_code } | OutcomeResult::HttpError { status_code } => {
                Some(*status_code)
            }
            OutcomeResult::TransportError { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, OutcomeResult::Success { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            OutcomeResult::TransportError {
                kind: TransportErrorKind::Cancelled
            }
        )
    }
}

/// Record of one request attempt. Created once by a worker, then moved into
/// the aggregator.
#[derive(Debug)]
pub struct Outcome {
    seq: u64,
    started_at: DateTime<Utc>,
    latency: Duration,
    target_url: Arc<str>,
    result: OutcomeResult,
    response_bytes: u64,
}

impl Outcome {
    #[must_use]
    pub const fn new(
        seq: u64,
        started_at: DateTime<Utc>,
        latency: Duration,
        target_url: Arc<str>,
        result: OutcomeResult,
        response_bytes: u64,
    ) -> Self {
        Self {
            seq,
            started_at,
            latency,
            target_url,
            result,
            response_bytes,
        }
    }

    /// Outcome for a dispatch that never reached the network because the run
    /// was cancelled first.
    #[must_use]
    pub fn cancelled_before_send(seq: u64, target_url: Arc<str>) -> Self {
        Self::new(
            seq,
            Utc::now(),
            Duration::ZERO,
            target_url,
            OutcomeResult::TransportError {
                kind: TransportErrorKind::Cancelled,
            },
            0,
        )
    }

    /// Outcome for a dispatch whose worker failed before producing a result.
    #[must_use]
    pub fn worker_failed(seq: u64, target_url: Arc<str>) -> Self {
        Self::new(
            seq,
            Utc::now(),
            Duration::ZERO,
            target_url,
            OutcomeResult::TransportError {
                kind: TransportErrorKind::Other,
            },
            0,
        )
    }

    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn latency(&self) -> Duration {
        self.latency
    }

    #[must_use]
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    #[must_use]
    pub const fn result(&self) -> OutcomeResult {
        self.result
    }

    #[must_use]
    pub const fn response_bytes(&self) -> u64 {
        self.response_bytes
    }

    pub(crate) fn target_key(&self) -> Arc<str> {
        Arc::clone(&self.target_url)
    }
}

/// Latency distribution in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub attempts: u64,
    pub successes: u64,
    pub http_errors: u64,
    pub transport_errors: u64,
    pub mean_latency_us: u64,
}

/// Completions observed in one progress window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSample {
    /// End of the window, measured from the start of collection.
    pub elapsed_ms: u64,
    pub completed: u64,
    pub successes: u64,
    pub mean_latency_us: u64,
}

/// Frozen statistics of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub total: u64,
    pub successes: u64,
    pub http_errors: u64,
    pub transport_errors: u64,
    /// Outcomes that reached a response or a real transport failure. Cancelled
    /// attempts are excluded.
    pub completed: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub transport_error_kinds: BTreeMap<TransportErrorKind, u64>,
    pub latency: LatencySummary,
    pub success_latency: LatencySummary,
    pub targets: BTreeMap<String, TargetSummary>,
    pub response_bytes: u64,
    pub skipped_ticks: u64,
    pub peak_in_flight: u64,
    pub achieved_rps_x100: u64,
    pub success_rate_x100: u64,
    /// Per-window progress, filled for paced runs only.
    pub progress: Vec<ProgressSample>,
}

impl RunStatistics {
    /// Sum of the per-kind counters; equals `total` for every frozen run.
    #[must_use]
    pub const fn kinds_total(&self) -> u64 {
        self.successes
            .saturating_add(self.http_errors)
            .saturating_add(self.transport_errors)
    }

    #[must_use]
    pub fn transport_errors_of(&self, kind: TransportErrorKind) -> u64 {
        self.transport_error_kinds.get(&kind).copied().unwrap_or(0)
    }
}

fn serialize_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}
