use std::sync::Arc;

use tracing::{info, warn};

use super::engine::drive;
use super::profile::{LoadProfile, RunSettings};
use crate::error::AppResult;
use crate::http::{HttpTransport, RequestTemplate};
use crate::metrics::RunStatistics;
use crate::shutdown::CancelSignal;

/// Result of a single probe.
#[derive(Debug, Clone)]
pub struct HealthVerdict {
    pub statistics: RunStatistics,
    pub cancelled: bool,
}

impl HealthVerdict {
    /// The probe got a response below 400.
    #[must_use]
    pub const fn passed(&self) -> bool {
        !self.cancelled && self.statistics.successes == 1
    }
}

/// Sends one request to the template's first target through the regular
/// worker pool.
pub struct HealthChecker {
    template: Arc<RequestTemplate>,
    transport: Arc<dyn HttpTransport>,
    settings: RunSettings,
}

impl HealthChecker {
    #[must_use]
    pub fn new(
        template: Arc<RequestTemplate>,
        transport: Arc<dyn HttpTransport>,
        settings: RunSettings,
    ) -> Self {
        Self {
            template,
            transport,
            settings,
        }
    }

    /// # Errors
    ///
    /// Returns an error only for internal failures; a failed request is a
    /// failed verdict.
    pub async fn probe(&self, cancel: CancelSignal) -> AppResult<HealthVerdict> {
        let driven = drive(
            Arc::clone(&self.template),
            &LoadProfile::Check,
            &self.settings,
            Arc::clone(&self.transport),
            cancel,
        )
        .await?;
        let verdict = HealthVerdict {
            statistics: driven.statistics,
            cancelled: driven.cancelled,
        };
        if verdict.passed() {
            info!("Probe succeeded in {}us", verdict.statistics.latency.max_us);
        } else {
            warn!(
                "Probe failed (status codes {:?}, transport errors {:?})",
                verdict.statistics.status_codes, verdict.statistics.transport_error_kinds
            );
        }
        Ok(verdict)
    }
}
