use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};

use super::histogram::LatencyHistogram;
use super::types::{
    LatencySummary, Outcome, OutcomeResult, ProgressSample, RunStatistics, TargetSummary,
    TransportErrorKind,
};

/// Run-level facts the aggregator cannot observe from outcomes alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFacts {
    pub wall_clock: Duration,
    pub skipped_ticks: u64,
    pub peak_in_flight: u64,
}

#[derive(Debug)]
struct LatencyTally {
    histogram: Option<LatencyHistogram>,
    count: u64,
    sum_us: u128,
    min_us: u64,
    max_us: u64,
}

impl LatencyTally {
    fn new() -> Self {
        let histogram = match LatencyHistogram::new() {
            Ok(histogram) => Some(histogram),
            Err(err) => {
                warn!("Latency percentiles disabled: {}", err);
                None
            }
        };
        Self {
            histogram,
            count: 0,
            sum_us: 0,
            min_us: u64::MAX,
            max_us: 0,
        }
    }

    fn record(&mut self, latency_us: u64) {
        self.count = self.count.saturating_add(1);
        self.sum_us = self.sum_us.saturating_add(u128::from(latency_us));
        self.min_us = self.min_us.min(latency_us);
        self.max_us = self.max_us.max(latency_us);
        if let Some(histogram) = self.histogram.as_mut()
            && let Err(err) = histogram.record(latency_us)
        {
            warn!("Dropping latency sample: {}", err);
        }
    }

    fn mean_us(&self) -> u64 {
        self.sum_us
            .checked_div(u128::from(self.count))
            .and_then(|mean| u64::try_from(mean).ok())
            .unwrap_or(0)
    }

    fn summary(&self) -> LatencySummary {
        if self.count == 0 {
            return LatencySummary::default();
        }
        let (p50_us, p90_us, p99_us) = self
            .histogram
            .as_ref()
            .map_or((0, 0, 0), LatencyHistogram::percentiles);
        LatencySummary {
            count: self.count,
            min_us: self.min_us,
            max_us: self.max_us,
            mean_us: self.mean_us(),
            p50_us,
            p90_us,
            p99_us,
        }
    }
}

/// Completions since the last progress mark. Cancelled outcomes are left out.
#[derive(Debug, Default)]
struct ProgressWindow {
    completed: u64,
    successes: u64,
    latency_sum_us: u128,
}

impl ProgressWindow {
    fn record(&mut self, success: bool, latency_us: u64) {
        self.completed = self.completed.saturating_add(1);
        if success {
            self.successes = self.successes.saturating_add(1);
        }
        self.latency_sum_us = self.latency_sum_us.saturating_add(u128::from(latency_us));
    }

    fn close(&mut self, elapsed: Duration) -> ProgressSample {
        let window = std::mem::take(self);
        ProgressSample {
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            completed: window.completed,
            successes: window.successes,
            mean_latency_us: window
                .latency_sum_us
                .checked_div(u128::from(window.completed))
                .and_then(|mean| u64::try_from(mean).ok())
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Default)]
struct TargetTally {
    attempts: u64,
    successes: u64,
    http_errors: u64,
    transport_errors: u64,
    latency_count: u64,
    latency_sum_us: u128,
}

impl TargetTally {
    fn summary(&self) -> TargetSummary {
        let mean_latency_us = self
            .latency_sum_us
            .checked_div(u128::from(self.latency_count))
            .and_then(|mean| u64::try_from(mean).ok())
            .unwrap_or(0);
        TargetSummary {
            attempts: self.attempts,
            successes: self.successes,
            http_errors: self.http_errors,
            transport_errors: self.transport_errors,
            mean_latency_us,
        }
    }
}

/// Folds outcomes into counters, per-status and per-kind maps and latency
/// histograms. Owned by a single collector task; never shared.
#[derive(Debug)]
pub struct ResultAggregator {
    total: u64,
    successes: u64,
    http_errors: u64,
    transport_errors: u64,
    cancelled: u64,
    status_codes: BTreeMap<u16, u64>,
    transport_error_kinds: BTreeMap<TransportErrorKind, u64>,
    all_latency: LatencyTally,
    success_latency: LatencyTally,
    targets: BTreeMap<Arc<str>, TargetTally>,
    response_bytes: u64,
    window: ProgressWindow,
    progress: Vec<ProgressSample>,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total: 0,
            successes: 0,
            http_errors: 0,
            transport_errors: 0,
            cancelled: 0,
            status_codes: BTreeMap::new(),
            transport_error_kinds: BTreeMap::new(),
            all_latency: LatencyTally::new(),
            success_latency: LatencyTally::new(),
            targets: BTreeMap::new(),
            response_bytes: 0,
            window: ProgressWindow::default(),
            progress: Vec::new(),
        }
    }

    /// Fold one outcome into the running totals.
    pub fn accept(&mut self, outcome: Outcome) {
        let result = outcome.result();
        self.total = self.total.saturating_add(1);
        self.response_bytes = self.response_bytes.saturating_add(outcome.response_bytes());

        let target = self.targets.entry(outcome.target_key()).or_default();
        target.attempts = target.attempts.saturating_add(1);

        match result {
            OutcomeResult::Success { status_code } => {
                self.successes = self.successes.saturating_add(1);
                target.successes = target.successes.saturating_add(1);
                bump(&mut self.status_codes, status_code);
            }
            OutcomeResult::HttpError { status_code } => {
                self.http_errors = self.http_errors.saturating_add(1);
                target.http_errors = target.http_errors.saturating_add(1);
                bump(&mut self.status_codes, status_code);
            }
            OutcomeResult::TransportError { kind } => {
                self.transport_errors = self.transport_errors.saturating_add(1);
                target.transport_errors = target.transport_errors.saturating_add(1);
                bump(&mut self.transport_error_kinds, kind);
                if kind == TransportErrorKind::Cancelled {
                    self.cancelled = self.cancelled.saturating_add(1);
                }
            }
        }

        if result.is_cancelled() {
            return;
        }

        let latency_us = u64::try_from(outcome.latency().as_micros()).unwrap_or(u64::MAX);
        target.latency_count = target.latency_count.saturating_add(1);
        target.latency_sum_us = target.latency_sum_us.saturating_add(u128::from(latency_us));
        self.window.record(result.is_success(), latency_us);
        self.all_latency.record(latency_us);
        if result.is_success() {
            self.success_latency.record(latency_us);
        }
    }

    /// Close the current progress window at `elapsed` into the run.
    pub fn mark_progress(&mut self, elapsed: Duration) -> ProgressSample {
        let sample = self.window.close(elapsed);
        self.progress.push(sample);
        sample
    }

    /// Whether outcomes arrived since the last progress mark.
    #[must_use]
    pub const fn has_unmarked_progress(&self) -> bool {
        self.window.completed > 0
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Produce the immutable statistics for the run.
    #[must_use]
    pub fn freeze(self, facts: RunFacts) -> RunStatistics {
        let completed = self.total.saturating_sub(self.cancelled);
        let wall_clock_ms = u64::try_from(facts.wall_clock.as_millis()).unwrap_or(u64::MAX);
        let achieved_rps_x100 = if wall_clock_ms > 0 {
            completed
                .saturating_mul(100_000)
                .checked_div(wall_clock_ms)
                .unwrap_or(0)
        } else {
            0
        };
        let success_rate_x100 = if self.total > 0 {
            self.successes
                .saturating_mul(10_000)
                .checked_div(self.total)
                .unwrap_or(0)
        } else {
            0
        };

        RunStatistics {
            duration: facts.wall_clock,
            total: self.total,
            successes: self.successes,
            http_errors: self.http_errors,
            transport_errors: self.transport_errors,
            completed,
            status_codes: self.status_codes,
            transport_error_kinds: self.transport_error_kinds,
            latency: self.all_latency.summary(),
            success_latency: self.success_latency.summary(),
            targets: self
                .targets
                .iter()
                .map(|(url, tally)| (url.to_string(), tally.summary()))
                .collect(),
            response_bytes: self.response_bytes,
            skipped_ticks: facts.skipped_ticks,
            peak_in_flight: facts.peak_in_flight,
            achieved_rps_x100,
            success_rate_x100,
            progress: self.progress,
        }
    }
}

fn bump<K: Ord>(map: &mut BTreeMap<K, u64>, key: K) {
    let entry = map.entry(key).or_insert(0);
    *entry = entry.saturating_add(1);
}

/// Sender half handed to workers. Cloning is cheap; the collector finishes
/// once every sink has been dropped.
#[derive(Debug, Clone)]
pub struct OutcomeSink {
    tx: mpsc::UnboundedSender<Outcome>,
}

impl OutcomeSink {
    pub fn record(&self, outcome: Outcome) {
        if let Err(err) = self.tx.send(outcome) {
            error!("Result aggregator is gone; outcome {} lost", err.0.seq());
        }
    }
}

/// Spawn the collector task that owns the aggregator.
///
/// With `progress_every` set, the collector closes a progress window on that
/// period and logs it, so long runs report live throughput and latency.
#[must_use]
pub fn spawn_result_aggregator(
    progress_every: Option<Duration>,
) -> (OutcomeSink, JoinHandle<ResultAggregator>) {
    let (tx, rx) = mpsc::unbounded_channel::<Outcome>();
    let handle = tokio::spawn(async move {
        match progress_every {
            Some(period) if !period.is_zero() => collect_with_progress(rx, period).await,
            Some(_) | None => collect(rx).await,
        }
    });
    (OutcomeSink { tx }, handle)
}

async fn collect(mut rx: mpsc::UnboundedReceiver<Outcome>) -> ResultAggregator {
    let mut aggregator = ResultAggregator::new();
    while let Some(outcome) = rx.recv().await {
        aggregator.accept(outcome);
    }
    aggregator
}

async fn collect_with_progress(
    mut rx: mpsc::UnboundedReceiver<Outcome>,
    period: Duration,
) -> ResultAggregator {
    let mut aggregator = ResultAggregator::new();
    let start = Instant::now();
    let mut ticker = interval_at(start.checked_add(period).unwrap_or(start), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(outcome) => aggregator.accept(outcome),
                None => break,
            },
            _ = ticker.tick() => {
                let sample = aggregator.mark_progress(start.elapsed());
                log_progress(&sample);
            }
        }
    }
    if aggregator.has_unmarked_progress() {
        let sample = aggregator.mark_progress(start.elapsed());
        log_progress(&sample);
    }
    aggregator
}

fn log_progress(sample: &ProgressSample) {
    info!(
        "[{}.{:02}s] completed {} | ok {} | avg {}.{:02}ms",
        sample.elapsed_ms / 1_000,
        (sample.elapsed_ms % 1_000) / 10,
        sample.completed,
        sample.successes,
        sample.mean_latency_us / 1_000,
        (sample.mean_latency_us % 1_000) / 10
    );
}
