//! Rate-paced task generation.
//!
//! The dispatcher emits one [`TaskDescriptor`] per tick of a fixed-interval
//! timer until the deadline, then drops its sender. Dropping the sender closes
//! the queue, which is the only stop signal the workers observe.
//!
//! Sends on the bounded queue block while it is full, so a saturated pool
//! lowers the offered rate instead of growing memory or dropping ticks.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::BenchmarkSpec;
use crate::metrics::TASKS_DISPATCHED_TOTAL;
use crate::task::TaskDescriptor;

/// Sending half of the task queue.
pub type TaskSender = mpsc::Sender<TaskDescriptor>;

/// Creates the bounded task queue for `spec`.
pub fn task_queue(spec: &BenchmarkSpec) -> (TaskSender, mpsc::Receiver<TaskDescriptor>) {
    mpsc::channel(spec.queue_capacity())
}

/// Emits tasks at `spec.dispatch_rate()` per second until `deadline`.
///
/// Random-mix runs get their concrete operation picked here, per task.
///
/// Returns the number of tasks enqueued. The queue is closed when this
/// returns, because `sender` is dropped.
pub async fn run_dispatcher(spec: BenchmarkSpec, sender: TaskSender, deadline: Instant) -> u64 {
    let period = spec.tick_interval();
    // First task goes out one period after start, like a plain ticker.
    let mut ticker = time::interval_at(Instant::now() + period, period);
    // A blocked send must not be followed by a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline_sleep = time::sleep_until(deadline);
    tokio::pin!(deadline_sleep);

    info!(
        benchmark_type = %spec.benchmark_type,
        dispatch_rate = spec.dispatch_rate(),
        period_us = period.as_micros() as u64,
        queue_capacity = spec.queue_capacity(),
        "Dispatcher starting"
    );

    let mut rng = StdRng::from_entropy();
    let mut dispatched: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut deadline_sleep => break,
            _ = ticker.tick() => {
                let task = TaskDescriptor::new(dispatched, spec.benchmark_type.resolve(&mut rng));
                if sender.send(task).await.is_err() {
                    // Every worker is gone; nothing can consume further tasks.
                    debug!(seq = dispatched, "Task queue receiver dropped");
                    break;
                }
                dispatched += 1;
                TASKS_DISPATCHED_TOTAL.inc();
            }
        }
    }

    info!(dispatched, "Dispatcher finished, closing task queue");
    dispatched
}
