use hdrhistogram::Histogram;

use crate::error::{AppError, AppResult, MetricsError};

/// Significant figures kept by the latency histogram.
const SIGNIFICANT_FIGURES: u8 = 3;

#[derive(Debug)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new auto-resizing latency histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> AppResult<Self> {
        let hist = Histogram::<u64>::new(SIGNIFICANT_FIGURES).map_err(|err| {
            AppError::metrics(MetricsError::Histogram {
                context: "create",
                source: Box::new(err),
            })
        })?;
        Ok(Self { hist })
    }

    /// Record a latency value in microseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be recorded.
    pub fn record(&mut self, latency_us: u64) -> AppResult<()> {
        let value = latency_us.max(1);
        self.hist.record(value).map_err(|err| {
            AppError::metrics(MetricsError::Histogram {
                context: "record",
                source: Box::new(err),
            })
        })
    }

    /// p50, p90 and p99 in microseconds.
    #[must_use]
    pub fn percentiles(&self) -> (u64, u64, u64) {
        if self.count() == 0 {
            return (0, 0, 0);
        }

        (
            self.hist.value_at_quantile(0.5),
            self.hist.value_at_quantile(0.9),
            self.hist.value_at_quantile(0.99),
        )
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}
