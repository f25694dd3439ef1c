use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{ErrorNormalizer, ErrorStats};
use crate::metrics::{
    ERRORS_BY_CATEGORY, TASKS_COMPLETED_TOTAL, TASKS_IN_FLIGHT, TASKS_TOTAL, TASK_DURATION_SECONDS,
};
use crate::percentiles::LatencyRecorder;
use crate::task::{ExecutionOutcome, TaskDescriptor, TaskExecutor};

/// Receiving half of the task queue, shared by every worker.
///
/// Workers take turns awaiting the next task; `recv` yields `None` only once
/// the dispatcher has closed the queue and it has been drained.
pub type TaskQueue = Arc<Mutex<mpsc::Receiver<TaskDescriptor>>>;

/// Wraps a receiver so the whole pool can pull from it.
pub fn shared_queue(receiver: mpsc::Receiver<TaskDescriptor>) -> TaskQueue {
    Arc::new(Mutex::new(receiver))
}

/// Mutable state of one run, shared by every worker.
///
/// Counters are lock-free; the latency samples and the error classes each
/// sit behind their own lock.
#[derive(Debug, Default)]
pub struct RunState {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    latencies: LatencyRecorder,
    errors: Arc<ErrorStats>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalizer(normalizer: ErrorNormalizer) -> Self {
        Self {
            errors: Arc::new(ErrorStats::with_normalizer(normalizer)),
            ..Self::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn latencies(&self) -> &LatencyRecorder {
        &self.latencies
    }

    pub fn errors(&self) -> &Arc<ErrorStats> {
        &self.errors
    }

    /// Accounts one finished task.
    ///
    /// Every call adds to the total, adds one latency sample and bumps
    /// exactly one of success or failed. Failures also go to the error
    /// aggregator.
    pub fn record(&self, outcome: &ExecutionOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.latencies.record(outcome.elapsed);
        match &outcome.result {
            Ok(()) => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            Err(failure) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.errors.record_failure(failure);
            }
        }
    }
}

/// Configuration for a worker task.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub worker_id: usize,
    pub verbose: bool,
}

/// Runs one worker until the queue is closed and empty.
///
/// In-flight and already-queued tasks always complete; nothing is cancelled
/// mid-request. Returns the number of tasks this worker processed.
pub async fn run_worker(
    config: WorkerConfig,
    queue: TaskQueue,
    executor: Arc<dyn TaskExecutor>,
    state: Arc<RunState>,
) -> u64 {
    debug!(worker_id = config.worker_id, "Worker starting");

    let mut processed: u64 = 0;

    loop {
        // The guard is released before the task runs so other workers can
        // pick up the next one.
        let next = { queue.lock().await.recv().await };
        let Some(task) = next else {
            break;
        };

        TASKS_TOTAL.inc();
        TASKS_IN_FLIGHT.inc();

        let outcome = executor.execute(&task).await;

        TASKS_IN_FLIGHT.dec();
        TASK_DURATION_SECONDS.observe(outcome.elapsed.as_secs_f64());
        state.record(&outcome);

        match &outcome.result {
            Ok(()) => {
                TASKS_COMPLETED_TOTAL.with_label_values(&["success"]).inc();
                debug!(
                    worker_id = config.worker_id,
                    seq = task.seq,
                    elapsed_us = outcome.elapsed.as_micros() as u64,
                    "Task completed"
                );
            }
            Err(failure) => {
                TASKS_COMPLETED_TOTAL.with_label_values(&["failed"]).inc();
                ERRORS_BY_CATEGORY
                    .with_label_values(&[failure.kind.label()])
                    .inc();

                if config.verbose {
                    debug!(
                        worker_id = config.worker_id,
                        seq = task.seq,
                        operation = %failure.operation,
                        error_category = %failure.kind.label(),
                        status_code = ?failure.status_code,
                        error = %failure.message,
                        "Task failed"
                    );
                }
            }
        }

        processed += 1;
    }

    debug!(
        worker_id = config.worker_id,
        processed, "Worker drained, stopping"
    );
    processed
}

/// Spawns `concurrency` workers sharing `queue`.
pub fn spawn_workers(
    concurrency: usize,
    verbose: bool,
    queue: TaskQueue,
    executor: Arc<dyn TaskExecutor>,
    state: Arc<RunState>,
) -> Vec<JoinHandle<u64>> {
    info!(concurrency, "Spawning worker pool");

    (0..concurrency)
        .map(|worker_id| {
            let config = WorkerConfig { worker_id, verbose };
            tokio::spawn(run_worker(
                config,
                queue.clone(),
                executor.clone(),
                state.clone(),
            ))
        })
        .collect()
}
