//! Drives one complete run: dispatcher, worker pool, drain, results.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info};

use crate::config::BenchmarkSpec;
use crate::dispatcher::{run_dispatcher, task_queue};
use crate::errors::ErrorNormalizer;
use crate::result::RunResult;
use crate::task::TaskExecutor;
use crate::worker::{shared_queue, spawn_workers, RunState};

/// Runs `spec` against `executor` and returns the aggregated result.
///
/// Returns only after the dispatcher has stopped and every worker has
/// drained the queue, so in-flight tasks may extend the run past
/// `spec.duration`.
pub async fn run_benchmark(
    spec: &BenchmarkSpec,
    executor: Arc<dyn TaskExecutor>,
    normalizer: ErrorNormalizer,
) -> RunResult {
    let state = Arc::new(RunState::with_normalizer(normalizer));
    let (sender, receiver) = task_queue(spec);
    let queue = shared_queue(receiver);

    info!(
        target_url = %spec.target_url,
        benchmark_type = %spec.benchmark_type,
        rate = spec.rate,
        duration = ?spec.duration,
        concurrency = spec.concurrency,
        "Starting benchmark run"
    );

    let start = Instant::now();
    let deadline = start + spec.duration;

    let workers = spawn_workers(
        spec.concurrency,
        spec.verbose,
        queue,
        executor,
        state.clone(),
    );

    let dispatched = match tokio::spawn(run_dispatcher(spec.clone(), sender, deadline)).await {
        Ok(count) => count,
        Err(e) => {
            // The sender went down with the task, so workers still drain.
            error!(error = %e, "Dispatcher task failed");
            0
        }
    };

    info!(dispatched, "Waiting for workers to drain the queue");

    for (worker_id, handle) in workers.into_iter().enumerate() {
        if let Err(e) = handle.await {
            error!(worker_id, error = %e, "Worker task failed");
        }
    }

    let total_duration = start.elapsed();
    let result = RunResult::calculate(spec.benchmark_type, &state, dispatched, total_duration);

    info!(
        total = result.total_requests,
        success = result.success_requests,
        failed = result.failed_requests,
        elapsed = ?total_duration,
        latency = %result.stats.format(),
        "Benchmark run finished"
    );

    result
}
