//! Sequencing of the create / read / update / delete cycle.
//!
//! A cycle is one unit of work. A failed create ends the cycle on the spot,
//! since there is no identifier to continue with. Once create has succeeded
//! the remaining three steps always run, and any failure among them turns
//! the whole cycle into a single [`ErrorKind::CycleError`] failure.

use std::time::Instant;

use tracing::debug;

use crate::errors::ErrorKind;
use crate::task::{CycleOperations, ExecutionOutcome, TaskFailure};

/// Operation label used for aggregated cycle failures.
pub const CYCLE_OPERATION: &str = "CRUD cycle";

/// Runs one full cycle against `ops`.
///
/// The returned elapsed time spans from before create to after delete, or
/// up to the create failure.
pub async fn run_cycle<O>(ops: &O) -> ExecutionOutcome
where
    O: CycleOperations + ?Sized,
{
    let start = Instant::now();

    let id = match ops.create_and_get_id().await {
        Ok(id) => id,
        Err(failure) => {
            debug!(operation = %failure.operation, "Cycle aborted at create");
            return ExecutionOutcome::failure(start.elapsed(), failure);
        }
    };

    let steps = [
        ("read", ops.read_by_id(id).await),
        ("update", ops.update_by_id(id).await),
        ("delete", ops.delete_by_id(id).await),
    ];
    let elapsed = start.elapsed();

    let failed: Vec<(&str, TaskFailure)> = steps
        .into_iter()
        .filter_map(|(step, result)| result.err().map(|failure| (step, failure)))
        .collect();

    match aggregate_step_failures(failed) {
        None => ExecutionOutcome::success(elapsed),
        Some(failure) => {
            debug!(id, error = %failure.message, "Cycle partially failed");
            ExecutionOutcome::failure(elapsed, failure)
        }
    }
}

/// Folds the failed steps of a cycle into one failure.
///
/// The message lists every failed step in order; status and body come from
/// the first of them.
fn aggregate_step_failures(failed: Vec<(&str, TaskFailure)>) -> Option<TaskFailure> {
    let (_, first) = failed.first()?;
    let mut failure = TaskFailure::new(
        CYCLE_OPERATION,
        ErrorKind::CycleError,
        failed
            .iter()
            .map(|(step, f)| format!("{}: {}", step, f.message))
            .collect::<Vec<_>>()
            .join("; "),
    );
    failure.status_code = first.status_code;
    failure.body_sample = first.body_sample.clone();
    Some(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedOps {
        fail_create: bool,
        fail_read: bool,
        fail_update: bool,
        fail_delete: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedOps {
        fn step(&self, name: &str, fail: bool, status: u16) -> Result<(), TaskFailure> {
            self.calls.lock().unwrap().push(name.to_string());
            if fail {
                Err(TaskFailure::new(name, ErrorKind::ServerError, format!("{} broke", name))
                    .with_status(status)
                    .with_body(format!("{} body", name)))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CycleOperations for ScriptedOps {
        async fn create_and_get_id(&self) -> Result<i64, TaskFailure> {
            self.step("create", self.fail_create, 500).map(|_| 7)
        }

        async fn read_by_id(&self, id: i64) -> Result<(), TaskFailure> {
            assert_eq!(id, 7);
            self.step("read", self.fail_read, 502)
        }

        async fn update_by_id(&self, id: i64) -> Result<(), TaskFailure> {
            assert_eq!(id, 7);
            self.step("update", self.fail_update, 503)
        }

        async fn delete_by_id(&self, id: i64) -> Result<(), TaskFailure> {
            assert_eq!(id, 7);
            self.step("delete", self.fail_delete, 504)
        }
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let ops = ScriptedOps::default();
        let outcome = run_cycle(&ops).await;

        assert!(outcome.is_success());
        assert_eq!(ops.calls(), vec!["create", "read", "update", "delete"]);
    }

    #[tokio::test]
    async fn test_create_failure_short_circuits() {
        let ops = ScriptedOps {
            fail_create: true,
            ..Default::default()
        };
        let outcome = run_cycle(&ops).await;

        assert_eq!(ops.calls(), vec!["create"]);
        let failure = outcome.failure_details().unwrap();
        assert_eq!(failure.operation, "create");
        assert_eq!(failure.kind, ErrorKind::ServerError);
        assert_eq!(failure.status_code, Some(500));
    }

    #[tokio::test]
    async fn test_update_failure_still_reads_and_deletes() {
        let ops = ScriptedOps {
            fail_update: true,
            ..Default::default()
        };
        let outcome = run_cycle(&ops).await;

        assert_eq!(ops.calls(), vec!["create", "read", "update", "delete"]);
        let failure = outcome.failure_details().unwrap();
        assert_eq!(failure.operation, CYCLE_OPERATION);
        assert_eq!(failure.kind, ErrorKind::CycleError);
        assert_eq!(failure.message, "update: update broke");
        assert_eq!(failure.status_code, Some(503));
        assert_eq!(failure.body_sample.as_deref(), Some("update body"));
    }

    #[tokio::test]
    async fn test_multiple_step_failures_are_joined() {
        let ops = ScriptedOps {
            fail_read: true,
            fail_delete: true,
            ..Default::default()
        };
        let outcome = run_cycle(&ops).await;

        let failure = outcome.failure_details().unwrap();
        assert_eq!(failure.message, "read: read broke; delete: delete broke");
        assert_eq!(failure.status_code, Some(502));
    }
}
