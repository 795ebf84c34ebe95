use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::rate::Dispatch;
use super::template::RequestTemplate;
use super::transport::HttpTransport;
use crate::error::{AppError, AppResult};
use crate::metrics::{Outcome, OutcomeResult, OutcomeSink, TransportErrorKind};
use crate::shutdown::CancelSignal;

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Maximum requests on the wire at once.
    pub capacity: usize,
    pub request_timeout: Duration,
    /// Measure latency from the scheduled dispatch time instead of from send.
    pub latency_correction: bool,
}

struct InflightGuard<'counter> {
    counter: &'counter AtomicU64,
}

impl<'counter> InflightGuard<'counter> {
    fn acquire(counter: &'counter AtomicU64, peak: &AtomicU64) -> Self {
        let current = counter.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        peak.fetch_max(current, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        loop {
            let current = self.counter.load(Ordering::Relaxed);
            let Some(next) = current.checked_sub(1) else {
                break;
            };
            if self
                .counter
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }
}

struct WorkerShared {
    transport: Arc<dyn HttpTransport>,
    template: Arc<RequestTemplate>,
    sink: OutcomeSink,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    settings: PoolSettings,
}

/// Bounded executor turning dispatches into outcomes.
///
/// Every submitted dispatch produces exactly one outcome. Dispatches beyond
/// capacity queue on the semaphore; once the run is cancelled, queued ones
/// are recorded as cancelled without touching the network, and in-flight
/// ones are cancelled only when [`WorkerPool::abort_in_flight`] is called.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    shared: Arc<WorkerShared>,
    cancel: CancelSignal,
    abort_tx: watch::Sender<bool>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(
        settings: PoolSettings,
        transport: Arc<dyn HttpTransport>,
        template: Arc<RequestTemplate>,
        sink: OutcomeSink,
        cancel: CancelSignal,
    ) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(settings.capacity.max(1))),
            tasks: JoinSet::new(),
            shared: Arc::new(WorkerShared {
                transport,
                template,
                sink,
                in_flight: AtomicU64::new(0),
                peak_in_flight: AtomicU64::new(0),
                settings,
            }),
            cancel,
            abort_tx,
        }
    }

    pub fn submit(&mut self, dispatch: Dispatch) {
        let permits = Arc::clone(&self.permits);
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let abort_rx = self.abort_tx.subscribe();
        self.tasks.spawn(async move {
            let seq = dispatch.seq();
            let target = Arc::clone(dispatch.target());
            let attempt = execute(&shared, permits, dispatch, cancel, abort_rx);
            let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("Worker for dispatch {} panicked", seq);
                    Outcome::worker_failed(seq, target)
                }
            };
            shared.sink.record(outcome);
        });
    }

    /// Dispatches submitted but not yet turned into outcomes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_in_flight(&self) -> u64 {
        self.shared.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Cancel requests still on the wire. Each records a cancelled outcome.
    pub fn abort_in_flight(&self) {
        let pending = self.pending();
        if pending > 0 {
            warn!("Aborting {} in-flight request(s)", pending);
        }
        self.abort_tx.send_replace(true);
    }

    /// Wait until every submitted dispatch has produced its outcome.
    ///
    /// Cancel safe: dropping the future loses no outcome.
    ///
    /// # Errors
    ///
    /// Returns the first worker join failure after all workers have finished.
    /// A panicking worker is not a join failure: it records a
    /// `TransportError{Other}` outcome for its dispatch.
    pub async fn drain(&mut self) -> AppResult<()> {
        let mut first_failure: Option<JoinError> = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!("Worker task failed: {}", err);
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
        first_failure.map_or(Ok(()), |err| Err(AppError::from(err)))
    }
}

async fn execute(
    shared: &WorkerShared,
    permits: Arc<Semaphore>,
    dispatch: Dispatch,
    mut cancel: CancelSignal,
    mut abort_rx: watch::Receiver<bool>,
) -> Outcome {
    let permit = if cancel.is_cancelled() {
        None
    } else {
        tokio::select! {
            biased;
            acquired = permits.acquire_owned() => match acquired {
                Ok(permit) => Some(permit),
                Err(err) => {
                    warn!("Worker pool closed: {}", err);
                    None
                }
            },
            () = cancel.cancelled() => None,
        }
    };
    let Some(_permit) = permit else {
        debug!("Dispatch {} cancelled before send", dispatch.seq());
        return Outcome::cancelled_before_send(dispatch.seq(), Arc::clone(dispatch.target()));
    };

    let _guard = InflightGuard::acquire(&shared.in_flight, &shared.peak_in_flight);
    let request = shared.template.resolve(&dispatch);
    let started_at = Utc::now();
    let sent_at = Instant::now();
    let result = tokio::select! {
        biased;
        () = aborted(&mut abort_rx) => Err(TransportErrorKind::Cancelled),
        sent = shared.transport.send(&request, shared.settings.request_timeout) => sent,
    };
    let origin = if shared.settings.latency_correction {
        dispatch.scheduled_at()
    } else {
        sent_at
    };
    let latency = Instant::now().saturating_duration_since(origin);

    let (result, response_bytes) = match result {
        Ok(response) => (OutcomeResult::from_status(response.status), response.body_bytes),
        Err(kind) => (OutcomeResult::TransportError { kind }, 0),
    };
    Outcome::new(
        dispatch.seq(),
        started_at,
        latency,
        Arc::clone(dispatch.target()),
        result,
        response_bytes,
    )
}

async fn aborted(abort_rx: &mut watch::Receiver<bool>) {
    if abort_rx.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}
