//! Latency sample collection and order-statistic percentiles.
//!
//! Samples are kept exactly (no histogram bucketing) so that the reported
//! percentiles are reproducible: a percentile `p` over `n` sorted samples is
//! the sample at index `floor(n * p)`, clamped to `n - 1`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Append-only, thread-safe collection of elapsed-time samples.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    samples: Mutex<Vec<Duration>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(latency);
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every recorded sample, leaving the recorder empty.
    pub fn take_samples(&self) -> Vec<Duration> {
        std::mem::take(&mut *self.samples.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Summary statistics over a finished sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyStats {
    pub count: usize,
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencyStats {
    /// Sorts `samples` in place and derives the summary from them.
    ///
    /// An empty sample set yields all-zero statistics.
    pub fn from_samples(samples: &mut [Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_unstable();

        let total_nanos: u128 = samples.iter().map(|d| d.as_nanos()).sum();
        let avg_nanos = total_nanos / samples.len() as u128;

        Self {
            count: samples.len(),
            min: samples[0],
            avg: Duration::from_nanos(avg_nanos as u64),
            max: samples[samples.len() - 1],
            p50: percentile(samples, 0.50),
            p95: percentile(samples, 0.95),
            p99: percentile(samples, 0.99),
        }
    }

    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:?}, avg={:?}, max={:?}, p50={:?}, p95={:?}, p99={:?}",
            self.count, self.min, self.avg, self.max, self.p50, self.p95, self.p99
        )
    }
}

/// Value at sorted index `floor(len * p)`, clamped to the last element.
///
/// `sorted` must already be in ascending order. Returns zero for an empty slice.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let index = (sorted.len() as f64 * p) as usize;
    sorted[index.min(sorted.len() - 1)]
}
