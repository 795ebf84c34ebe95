use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::check::HealthChecker;
use super::engine::drive;
use super::profile::{LoadProfile, RunMode, RunSettings};
use crate::error::AppResult;
use crate::http::{HttpTransport, RequestTemplate};
use crate::metrics::RunStatistics;
use crate::shutdown::{CancelSignal, ShutdownReceiver, watch_shutdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Aborted,
}

impl RunState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Aborted => "aborted",
        }
    }
}

/// Terminal state and frozen statistics of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub mode: RunMode,
    pub statistics: RunStatistics,
}

impl RunReport {
    /// Whether a check-mode probe succeeded; `None` for other modes.
    #[must_use]
    pub const fn check_passed(&self) -> Option<bool> {
        match self.mode {
            RunMode::Check => Some(
                matches!(self.state, RunState::Completed) && self.statistics.successes == 1,
            ),
            RunMode::Burst | RunMode::Rps | RunMode::Multi => None,
        }
    }
}

/// Owns one run end to end: validation, optional preflight, pacing,
/// execution, draining and the terminal state.
///
/// Cancellation stops new dispatches at once. Dispatches still waiting for a
/// pool slot are recorded as cancelled; requests on the wire get
/// `cancel_grace` to finish and are then aborted. Every dispatch ends up as
/// exactly one outcome either way.
pub struct RunController {
    template: Arc<RequestTemplate>,
    profile: LoadProfile,
    settings: RunSettings,
    transport: Arc<dyn HttpTransport>,
    state: RunState,
}

impl RunController {
    #[must_use]
    pub fn new(
        template: RequestTemplate,
        profile: LoadProfile,
        settings: RunSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            template: Arc::new(template),
            profile,
            settings,
            transport,
            state: RunState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Execute the run until it completes, is cancelled through
    /// `shutdown_rx`, or is aborted by a failed preflight.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any request is sent when the
    /// profile, template or settings are invalid, or an error if an internal
    /// task fails.
    pub async fn run(mut self, shutdown_rx: ShutdownReceiver) -> AppResult<RunReport> {
        self.profile.validate(&self.template, &self.settings)?;
        let (cancel, forwarder) = watch_shutdown(shutdown_rx);
        self.transition(RunState::Running);
        let report = self.execute(cancel).await;
        forwarder.abort();
        report
    }

    async fn execute(&mut self, cancel: CancelSignal) -> AppResult<RunReport> {
        let mode = self.profile.mode();
        info!(
            "Starting {} run: {} {} target(s)",
            mode.as_str(),
            self.template.method().as_str(),
            self.template.urls().len()
        );

        if self.settings.preflight && mode != RunMode::Check {
            let checker = HealthChecker::new(
                Arc::clone(&self.template),
                Arc::clone(&self.transport),
                self.settings,
            );
            let verdict = checker.probe(cancel.clone()).await?;
            if !verdict.passed() {
                let state = if verdict.cancelled {
                    RunState::Cancelled
                } else {
                    warn!("Preflight probe failed; aborting run");
                    RunState::Aborted
                };
                self.transition(state);
                return Ok(RunReport {
                    state,
                    mode,
                    statistics: verdict.statistics,
                });
            }
        }

        let driven = drive(
            Arc::clone(&self.template),
            &self.profile,
            &self.settings,
            Arc::clone(&self.transport),
            cancel,
        )
        .await?;
        let state = if driven.cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        self.transition(state);
        info!(
            "Run {} after {}ms: {} request(s)",
            state.as_str(),
            driven.statistics.duration.as_millis(),
            driven.statistics.total
        );
        Ok(RunReport {
            state,
            mode,
            statistics: driven.statistics,
        })
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
    }
}
