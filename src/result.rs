use std::sync::Arc;
use std::time::Duration;

use crate::errors::ErrorStats;
use crate::percentiles::LatencyStats;
use crate::task::{BenchmarkType, CYCLE_STEPS};
use crate::worker::RunState;

/// Everything one finished run produced.
///
/// Built once every worker has exited; at that point
/// `total_requests == success_requests + failed_requests == latencies.len()`.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub benchmark_type: BenchmarkType,
    /// Units of work executed (cycles for the CRUD cycle).
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    /// Units the dispatcher enqueued.
    pub dispatched_tasks: u64,
    /// Wall time from start until the pool drained.
    pub total_duration: Duration,
    /// Latency samples, sorted ascending.
    pub latencies: Vec<Duration>,
    pub stats: LatencyStats,
    pub errors: Arc<ErrorStats>,
}

impl RunResult {
    /// Collects the final counters and samples out of `state`.
    pub fn calculate(
        benchmark_type: BenchmarkType,
        state: &RunState,
        dispatched_tasks: u64,
        total_duration: Duration,
    ) -> Self {
        let mut latencies = state.latencies().take_samples();
        let stats = LatencyStats::from_samples(&mut latencies);

        Self {
            benchmark_type,
            total_requests: state.total(),
            success_requests: state.success(),
            failed_requests: state.failed(),
            dispatched_tasks,
            total_duration,
            latencies,
            stats,
            errors: state.errors().clone(),
        }
    }

    pub fn is_cycle(&self) -> bool {
        self.benchmark_type.is_cycle()
    }

    /// Approximate underlying HTTP calls.
    ///
    /// A successful cycle issued all of its calls; a failed one is counted
    /// once because how far it got is not tracked.
    pub fn total_http_requests(&self) -> u64 {
        if self.is_cycle() {
            self.success_requests * CYCLE_STEPS as u64 + self.failed_requests
        } else {
            self.total_requests
        }
    }

    /// Achieved HTTP calls per second over the whole run.
    pub fn actual_rps(&self) -> f64 {
        per_second(self.total_http_requests(), self.total_duration)
    }

    /// Completed cycles per second; equal to the task rate for simple runs.
    pub fn cycles_per_second(&self) -> f64 {
        per_second(self.total_requests, self.total_duration)
    }

    pub fn success_percent(&self) -> f64 {
        percent(self.success_requests, self.total_requests)
    }

    pub fn failed_percent(&self) -> f64 {
        percent(self.failed_requests, self.total_requests)
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::task::{ExecutionOutcome, TaskFailure};

    fn state_with(success: u64, failed: u64) -> RunState {
        let state = RunState::new();
        for i in 0..success {
            state.record(&ExecutionOutcome::success(Duration::from_millis(i + 1)));
        }
        for i in 0..failed {
            state.record(&ExecutionOutcome::failure(
                Duration::from_millis(100 + i),
                TaskFailure::new("op", ErrorKind::ServerError, "boom").with_status(500),
            ));
        }
        state
    }

    #[test]
    fn test_calculate_simple_run() {
        let state = state_with(8, 2);
        let result = RunResult::calculate(
            BenchmarkType::GetProducts,
            &state,
            10,
            Duration::from_secs(2),
        );

        assert_eq!(result.total_requests, 10);
        assert_eq!(result.success_requests, 8);
        assert_eq!(result.failed_requests, 2);
        assert_eq!(result.latencies.len(), 10);
        assert!(result.latencies.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(result.stats.max, Duration::from_millis(101));
        assert_eq!(result.total_http_requests(), 10);
        assert!((result.actual_rps() - 5.0).abs() < f64::EPSILON);
        assert!((result.success_percent() - 80.0).abs() < 1e-9);
        assert_eq!(result.errors.total_count(), 2);
    }

    #[test]
    fn test_cycle_http_request_estimate() {
        let state = state_with(5, 3);
        let result = RunResult::calculate(
            BenchmarkType::MixedOperations,
            &state,
            8,
            Duration::from_secs(1),
        );

        assert_eq!(result.total_http_requests(), 5 * 4 + 3);
        assert!((result.actual_rps() - 23.0).abs() < 1e-9);
        assert!((result.cycles_per_second() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run() {
        let state = RunState::new();
        let result = RunResult::calculate(
            BenchmarkType::GetProducts,
            &state,
            0,
            Duration::ZERO,
        );

        assert_eq!(result.stats, LatencyStats::default());
        assert_eq!(result.actual_rps(), 0.0);
        assert_eq!(result.success_percent(), 0.0);
    }
}
