use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use super::target::TargetSelector;
use crate::shutdown::CancelSignal;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Authorization to send one request.
#[derive(Debug, Clone)]
pub struct Dispatch {
    seq: u64,
    target: Arc<str>,
    scheduled_at: Instant,
}

impl Dispatch {
    #[must_use]
    pub const fn new(seq: u64, target: Arc<str>, scheduled_at: Instant) -> Self {
        Self {
            seq,
            target,
            scheduled_at,
        }
    }

    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub const fn target(&self) -> &Arc<str> {
        &self.target
    }

    /// When the pacer intended this dispatch to go out.
    #[must_use]
    pub const fn scheduled_at(&self) -> Instant {
        self.scheduled_at
    }
}

#[derive(Debug)]
pub enum Pace {
    Dispatch(Dispatch),
    Exhausted,
    Cancelled,
}

/// Ideal tick times for a sustained rate, anchored to one start instant.
///
/// Tick `n` is due at `start + n * 1s / rate`, computed from the anchor each
/// time so rounding never accumulates.
#[derive(Debug, Clone, Copy)]
pub struct TickSchedule {
    start: Instant,
    rate: u64,
    total_ticks: u64,
}

impl TickSchedule {
    /// `rate` of zero is treated as one.
    #[must_use]
    pub fn new(start: Instant, rate: u64, duration: Duration) -> Self {
        let rate = rate.max(1);
        let total = duration
            .as_nanos()
            .saturating_mul(u128::from(rate))
            .checked_div(NANOS_PER_SEC)
            .unwrap_or(0);
        Self {
            start,
            rate,
            total_ticks: u64::try_from(total).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub const fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        nanos_to_duration(NANOS_PER_SEC.checked_div(u128::from(self.rate)).unwrap_or(0))
    }

    #[must_use]
    pub fn due(&self, tick: u64) -> Instant {
        let offset = u128::from(tick)
            .saturating_mul(NANOS_PER_SEC)
            .checked_div(u128::from(self.rate))
            .unwrap_or(0);
        self.start
            .checked_add(nanos_to_duration(offset))
            .unwrap_or(self.start)
    }

    /// Index of the most recent tick due at or before `now`.
    #[must_use]
    pub fn latest_due(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let ticks = elapsed
            .saturating_mul(u128::from(self.rate))
            .checked_div(NANOS_PER_SEC)
            .unwrap_or(0);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[derive(Debug)]
enum Policy {
    /// Fixed number of dispatches, all due immediately.
    Immediate { count: u64 },
    /// One dispatch per tick of a schedule.
    Paced { schedule: TickSchedule },
}

/// Decides when the next dispatch goes out and where it goes.
///
/// The only component in a run that waits on the clock.
#[derive(Debug)]
pub struct RatePacer {
    policy: Policy,
    selector: TargetSelector,
    next_tick: u64,
    next_seq: u64,
    skipped: u64,
}

impl RatePacer {
    /// Authorize `count` dispatches with no delay between them.
    #[must_use]
    pub const fn immediate(count: u64, selector: TargetSelector) -> Self {
        Self {
            policy: Policy::Immediate { count },
            selector,
            next_tick: 0,
            next_seq: 0,
            skipped: 0,
        }
    }

    /// Authorize one dispatch per schedule tick.
    #[must_use]
    pub const fn paced(schedule: TickSchedule, selector: TargetSelector) -> Self {
        Self {
            policy: Policy::Paced { schedule },
            selector,
            next_tick: 0,
            next_seq: 0,
            skipped: 0,
        }
    }

    /// Ticks dropped by the jitter correction so far.
    #[must_use]
    pub const fn skipped_ticks(&self) -> u64 {
        self.skipped
    }

    /// Wait for and return the next dispatch.
    ///
    /// A paced pacer that wakes more than one interval late jumps to the
    /// latest due tick and counts the ticks in between as skipped; missed
    /// ticks are never sent as a burst.
    pub async fn next_dispatch(&mut self, cancel: &mut CancelSignal) -> Pace {
        if cancel.is_cancelled() {
            return Pace::Cancelled;
        }

        let scheduled_at = match self.policy {
            Policy::Immediate { count } => {
                if self.next_tick >= count {
                    return Pace::Exhausted;
                }
                self.next_tick = self.next_tick.saturating_add(1);
                Instant::now()
            }
            Policy::Paced { schedule } => {
                if self.next_tick >= schedule.total_ticks() {
                    return Pace::Exhausted;
                }
                let due = schedule.due(self.next_tick);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Pace::Cancelled,
                    () = sleep_until(due) => {}
                }
                let tick = self.catch_up(&schedule, due, Instant::now());
                self.next_tick = tick.saturating_add(1);
                schedule.due(tick)
            }
        };

        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let target = self.selector.next_target();
        debug!("Dispatch {} -> {}", seq, target);
        Pace::Dispatch(Dispatch::new(seq, target, scheduled_at))
    }

    fn catch_up(&mut self, schedule: &TickSchedule, due: Instant, now: Instant) -> u64 {
        let lag = now.saturating_duration_since(due);
        if lag <= schedule.interval() {
            return self.next_tick;
        }
        let last_tick = schedule.total_ticks().saturating_sub(1);
        let tick = schedule.latest_due(now).min(last_tick).max(self.next_tick);
        let skipped = tick.saturating_sub(self.next_tick);
        if skipped > 0 {
            self.skipped = self.skipped.saturating_add(skipped);
            warn!(
                "Pacer fell behind by {}ms; skipping {} tick(s)",
                lag.as_millis(),
                skipped
            );
        }
        tick
    }
}
