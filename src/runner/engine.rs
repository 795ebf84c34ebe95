use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use super::profile::{LoadProfile, RunSettings};
use crate::error::AppResult;
use crate::http::{HttpTransport, Pace, PoolSettings, RequestTemplate, WorkerPool};
use crate::metrics::{RunFacts, RunStatistics, spawn_result_aggregator};
use crate::shutdown::CancelSignal;

/// Period of the live progress log in RPS mode.
const PROGRESS_PERIOD: Duration = Duration::from_secs(1);

pub(crate) struct Driven {
    pub(crate) statistics: RunStatistics,
    pub(crate) cancelled: bool,
}

/// Pace, execute and aggregate one profile until every dispatch has an
/// outcome.
pub(crate) async fn drive(
    template: Arc<RequestTemplate>,
    profile: &LoadProfile,
    settings: &RunSettings,
    transport: Arc<dyn HttpTransport>,
    mut cancel: CancelSignal,
) -> AppResult<Driven> {
    let start = Instant::now();
    let mut pacer = profile.pacer(&template, start)?;
    let capacity = profile.pool_capacity(settings);
    let progress_every = match profile {
        LoadProfile::Rps { .. } => Some(PROGRESS_PERIOD),
        LoadProfile::Burst { .. } | LoadProfile::Multi { .. } | LoadProfile::Check => None,
    };
    let (sink, collector) = spawn_result_aggregator(progress_every);
    let mut pool = WorkerPool::new(
        PoolSettings {
            capacity,
            request_timeout: settings.request_timeout,
            latency_correction: settings.latency_correction
                && matches!(profile, LoadProfile::Rps { .. }),
        },
        transport,
        template,
        sink,
        cancel.clone(),
    );
    debug!("Pool capacity {}", capacity);

    let mut cancelled = false;
    loop {
        match pacer.next_dispatch(&mut cancel).await {
            Pace::Dispatch(dispatch) => pool.submit(dispatch),
            Pace::Exhausted => break,
            Pace::Cancelled => {
                cancelled = true;
                break;
            }
        }
    }

    // A paced run lasts its full window even though the last tick is due one
    // interval before the end.
    if !cancelled && let LoadProfile::Rps { duration, .. } = profile {
        let window_end = start.checked_add(*duration).unwrap_or(start);
        tokio::select! {
            biased;
            () = cancel.cancelled() => cancelled = true,
            () = sleep_until(window_end) => {}
        }
    }

    if !cancelled {
        tokio::select! {
            biased;
            drained = pool.drain() => drained?,
            () = cancel.cancelled() => cancelled = true,
        }
    }
    if cancelled {
        drain_after_cancel(&mut pool, settings.cancel_grace).await?;
    }

    let facts = RunFacts {
        wall_clock: start.elapsed(),
        skipped_ticks: pacer.skipped_ticks(),
        peak_in_flight: pool.peak_in_flight(),
    };
    drop(pool);
    let aggregator = collector.await?;
    Ok(Driven {
        statistics: aggregator.freeze(facts),
        cancelled,
    })
}

/// Give in-flight requests `grace` to finish, then abort the rest.
async fn drain_after_cancel(pool: &mut WorkerPool, grace: Duration) -> AppResult<()> {
    info!(
        "Cancellation requested; waiting up to {}ms for {} in-flight request(s)",
        grace.as_millis(),
        pool.in_flight()
    );
    if let Ok(drained) = tokio::time::timeout(grace, pool.drain()).await {
        return drained;
    }
    pool.abort_in_flight();
    pool.drain().await
}
