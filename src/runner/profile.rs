use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::args::Distribution;
use crate::args::defaults::{DEFAULT_CANCEL_GRACE, DEFAULT_TIMEOUT};
use crate::error::ConfigurationError;
use crate::http::{RatePacer, RequestTemplate, TargetSelector, TickSchedule};

/// Declarative description of how many requests go out, how fast, and where.
///
/// Targets come from the [`RequestTemplate`]: single-target modes require
/// exactly one URL, multi mode spreads dispatches over all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    /// One wave of `concurrency` simultaneous requests.
    Burst { concurrency: usize },
    /// `rate` requests per second for `duration`.
    Rps { rate: u64, duration: Duration },
    /// Like burst, with targets chosen per dispatch.
    Multi {
        concurrency: usize,
        distribution: Distribution,
    },
    /// Exactly one request.
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Burst,
    Rps,
    Multi,
    Check,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunMode::Burst => "burst",
            RunMode::Rps => "rps",
            RunMode::Multi => "multi",
            RunMode::Check => "check",
        }
    }
}

/// Run-level knobs that are not part of the load shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub request_timeout: Duration,
    /// How long in-flight requests may finish after cancellation before they
    /// are aborted.
    pub cancel_grace: Duration,
    /// RPS pool capacity; defaults to twice the rate.
    pub max_in_flight: Option<usize>,
    /// Measure RPS latency from the scheduled tick instead of from send.
    pub latency_correction: bool,
    /// Probe the first target before the run.
    pub preflight: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            cancel_grace: DEFAULT_CANCEL_GRACE,
            max_in_flight: None,
            latency_correction: false,
            preflight: false,
        }
    }
}

impl LoadProfile {
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        match self {
            LoadProfile::Burst { .. } => RunMode::Burst,
            LoadProfile::Rps { .. } => RunMode::Rps,
            LoadProfile::Multi { .. } => RunMode::Multi,
            LoadProfile::Check => RunMode::Check,
        }
    }

    /// Check the profile against the template and settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(
        &self,
        template: &RequestTemplate,
        settings: &RunSettings,
    ) -> Result<(), ConfigurationError> {
        match self {
            LoadProfile::Burst { concurrency } | LoadProfile::Multi { concurrency, .. } => {
                if *concurrency == 0 {
                    return Err(ConfigurationError::ZeroConcurrency);
                }
            }
            LoadProfile::Rps { rate, .. } => {
                if *rate == 0 {
                    return Err(ConfigurationError::ZeroRate);
                }
            }
            LoadProfile::Check => {}
        }

        let count = template.urls().len();
        if count == 0 {
            return Err(ConfigurationError::EmptyUrlList);
        }
        if count > 1 && !matches!(self, LoadProfile::Multi { .. }) {
            return Err(ConfigurationError::TooManyUrls {
                mode: self.mode().as_str(),
                count,
            });
        }

        if settings.request_timeout.is_zero() {
            return Err(ConfigurationError::ZeroTimeout);
        }
        if settings.max_in_flight == Some(0) {
            return Err(ConfigurationError::ZeroMaxInFlight);
        }
        Ok(())
    }

    /// Maximum number of requests on the wire at once.
    #[must_use]
    pub fn pool_capacity(&self, settings: &RunSettings) -> usize {
        let capacity = match self {
            LoadProfile::Burst { concurrency } | LoadProfile::Multi { concurrency, .. } => {
                (*concurrency).max(1)
            }
            LoadProfile::Rps { rate, .. } => settings.max_in_flight.unwrap_or_else(|| {
                usize::try_from(rate.saturating_mul(2)).unwrap_or(usize::MAX)
            }),
            LoadProfile::Check => 1,
        };
        capacity.max(1)
    }

    /// Build the pacer for this profile, anchored at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error when the template has no target.
    pub fn pacer(
        &self,
        template: &RequestTemplate,
        start: Instant,
    ) -> Result<RatePacer, ConfigurationError> {
        let first = template
            .urls()
            .first()
            .cloned()
            .ok_or(ConfigurationError::EmptyUrlList)?;
        let pacer = match self {
            LoadProfile::Burst { concurrency } => {
                RatePacer::immediate(as_count(*concurrency), TargetSelector::single(first))
            }
            LoadProfile::Multi {
                concurrency,
                distribution,
            } => {
                let targets = template.urls().iter().map(Arc::clone).collect();
                RatePacer::immediate(
                    as_count(*concurrency),
                    TargetSelector::new(targets, *distribution)?,
                )
            }
            LoadProfile::Rps { rate, duration } => RatePacer::paced(
                TickSchedule::new(start, *rate, *duration),
                TargetSelector::single(first),
            ),
            LoadProfile::Check => RatePacer::immediate(1, TargetSelector::single(first)),
        };
        Ok(pacer)
    }
}

fn as_count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
