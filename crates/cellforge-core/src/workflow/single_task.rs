//! Single-task workflow (spec.md §4.9): bootstrap a cell, hand it one
//! task, verify, commit or revert, and tear down unconditionally.
//!
//! There is no external workflow engine dependency in this crate's
//! stack, so the activity-style retry/heartbeat/timeout policy spec.md
//! describes is reproduced directly as plain async orchestration: a
//! small exponential-backoff helper stands in for the engine's retry
//! policy, and teardown runs detached (via `tokio::spawn`) so it still
//! completes if the caller drops or cancels the outer future.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Cell, CellId, Requirement, TestResult};
use crate::lifecycle::CellLifecycleCoordinator;
use crate::{Error, Result};

/// Default start-to-close timeout for implementation-weight activities.
pub const IMPLEMENTATION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default start-to-close timeout for light activities (status checks,
/// commit/revert).
pub const LIGHT_TIMEOUT: Duration = Duration::from_secs(30);
/// Heartbeat interval expected from long-running activities.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const RETRY_COEFFICIENT: u32 = 2;
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(60);
const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Seam over the worker-driven steps a single task needs: implement the
/// requirement in the cell's working copy, then run its test suite.
/// Isolating this behind a trait keeps the workflow itself testable
/// without a real worker process on the other end of a port.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Drive the worker to implement `requirement` inside `cell`.
    async fn implement(&self, cell: &Cell, requirement: &Requirement) -> Result<()>;
    /// Run the task's test suite inside `cell` and report the result.
    async fn run_tests(&self, cell: &Cell) -> Result<TestResult>;
}

/// Retry an idempotent activity with exponential backoff, following the
/// engine defaults: initial 1s, coefficient 2, capped at 60s, up to 3
/// attempts.
async fn with_retry<F, Fut, T>(mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = RETRY_INITIAL_BACKOFF;
    let mut last_err = None;
    for attempt_number in 1..=RETRY_MAX_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(attempt_number, error = %e, "activity attempt failed");
                last_err = Some(e);
                if attempt_number < RETRY_MAX_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * RETRY_COEFFICIENT, RETRY_MAX_BACKOFF);
                }
            }
        }
    }
    Err(last_err.unwrap_or(Error::Other("retry loop exited without an attempt".into())))
}

/// How the workflow reacts when verification fails and `retry_on_external_signal`
/// is set: it waits for a signal before retrying instead of reverting
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleTaskOutcome {
    /// The implementation passed its tests and was committed.
    Committed,
    /// The implementation failed verification and was reverted.
    Reverted,
}

/// Configuration for one single-task workflow run, resolving spec.md
/// §9's open question: by default a failed verification reverts and
/// tears the cell down immediately; when `retry_on_external_signal` is
/// set, the workflow instead waits on `resume` before retrying the
/// implementation step once more.
pub struct SingleTaskConfig {
    /// Branch the cell's working copy is created on.
    pub branch: String,
    /// If true, a failing verification waits for an external signal
    /// before retrying rather than reverting immediately.
    pub retry_on_external_signal: bool,
    /// Signal awaited when `retry_on_external_signal` is set. Receiving
    /// any value (or the channel closing) resumes the workflow.
    pub resume: Option<tokio::sync::oneshot::Receiver<()>>,
}

impl SingleTaskConfig {
    /// Construct a config that reverts immediately on verification
    /// failure, which is the default per spec.md §9.
    #[must_use]
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            retry_on_external_signal: false,
            resume: None,
        }
    }
}

/// Runs the bootstrap -> implement -> verify -> commit-or-revert ->
/// teardown cycle for a single task.
pub struct SingleTaskWorkflow<E: TaskExecutor> {
    coordinator: CellLifecycleCoordinator,
    executor: E,
}

impl<E: TaskExecutor> SingleTaskWorkflow<E> {
    /// Construct a workflow over the given lifecycle coordinator and
    /// task executor seam.
    #[must_use]
    pub fn new(coordinator: CellLifecycleCoordinator, executor: E) -> Self {
        Self {
            coordinator,
            executor,
        }
    }

    /// Run one task end to end. Teardown always runs, even if an
    /// earlier step failed, by detaching it onto its own task so a
    /// cancelled or dropped outer future cannot leak the cell's
    /// resources.
    pub async fn run(
        &self,
        cell_id: CellId,
        requirement: &Requirement,
        mut config: SingleTaskConfig,
    ) -> Result<SingleTaskOutcome> {
        let cell = self.coordinator.bootstrap(cell_id, &config.branch).await?;

        let outcome = self.implement_and_verify(&cell, requirement, &mut config).await;

        let coordinator = self.coordinator.clone();
        let cell_for_teardown = cell.clone();
        let teardown = tokio::spawn(async move {
            if let Err(e) = coordinator.teardown(&cell_for_teardown).await {
                tracing::warn!(cell_id = %cell_for_teardown.id, error = %e, "single-task teardown failed");
            }
        });
        let _ = teardown.await;

        outcome
    }

    async fn implement_and_verify(
        &self,
        cell: &Cell,
        requirement: &Requirement,
        config: &mut SingleTaskConfig,
    ) -> Result<SingleTaskOutcome> {
        // Implementation is not idempotent against a worker session's
        // conversational state, so it gets a single attempt.
        self.executor.implement(cell, requirement).await?;

        // Running the test suite is idempotent (no state mutation), so
        // it is retried with backoff against transient worker hiccups.
        let mut result = with_retry(|| self.executor.run_tests(cell)).await?;

        if !result.is_passing() && config.retry_on_external_signal {
            if let Some(resume) = config.resume.take() {
                let _ = resume.await;
                self.executor.implement(cell, requirement).await?;
                result = with_retry(|| self.executor.run_tests(cell)).await?;
            }
        }

        if result.is_passing() {
            self.coordinator
                .working_copies()
                .commit(&cell.working_copy_id, &format!("implement {}", requirement.task_id))
                .await?;
            Ok(SingleTaskOutcome::Committed)
        } else {
            self.coordinator
                .working_copies()
                .revert(&cell.working_copy_id)
                .await?;
            Ok(SingleTaskOutcome::Reverted)
        }
    }
}
