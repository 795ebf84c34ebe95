mod aggregator;
mod histogram;
mod types;


pub use aggregator::{OutcomeSink, ResultAggregator, RunFacts, spawn_result_aggregator};
pub use histogram::LatencyHistogram;
pub use types::{
    HTTP_ERROR_STATUS_FLOOR, LatencySummary, Outcome, OutcomeResult, ProgressSample, RunStatistics,
    TargetSummary, TransportErrorKind,
};
