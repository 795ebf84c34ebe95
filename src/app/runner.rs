use std::sync::Arc;

use super::plan::RunPlan;
use crate::error::AppResult;
use crate::http::ReqwestTransport;
use crate::runner::{RunController, RunReport};
use crate::shutdown::ShutdownSender;
use crate::shutdown_handlers::setup_signal_shutdown_handler;

/// Run a plan against the network, cancelling on Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error when the HTTP client cannot be built, the plan is
/// invalid, or an internal task fails.
pub(crate) async fn run_local(plan: RunPlan, shutdown_tx: &ShutdownSender) -> AppResult<RunReport> {
    let transport = ReqwestTransport::new(&plan.client)?;
    let shutdown_rx = shutdown_tx.subscribe();
    let signal_handle = setup_signal_shutdown_handler(shutdown_tx);

    let report = RunController::new(plan.template, plan.profile, plan.settings, Arc::new(transport))
        .run(shutdown_rx)
        .await;
    signal_handle.abort();
    report
}
