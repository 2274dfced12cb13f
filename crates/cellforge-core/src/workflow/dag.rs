//! DAG workflow (spec.md §4.9): round-based ready-set execution over a
//! full task graph, and the "Enhanced" six-gate saga variant that drives
//! a single task through the full RED/GREEN/review cycle with
//! compensation on any gate failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AgentConfig, AgentResult, CellId, GateResult, Requirement, TaskId};
use crate::gates::g1_requirements::RequirementsGate;
use crate::gates::g2_immutability::ImmutabilityGate;
use crate::gates::g3_honesty::HonestyGate;
use crate::gates::g4_hardwork::{HardWorkConfig, HardWorkGate};
use crate::gates::g5_drift::DriftGate;
use crate::gates::Gate;
use crate::learning::LearningSink;
use crate::lifecycle::CellLifecycleCoordinator;
use crate::locks::{FileLockRegistry, LockRequest};
use crate::orchestrator::{Scheduler, SchedulerCallbacks, TaskGraph, TaskOutcome};
use crate::workflow::slices::{
    self, LintReport, ModifiedFile, ReviewOutcome, ReviewVote, TestCase,
};
use crate::Result;

/// Input to the DAG workflow: the full admitted task set and the task
/// treated as the graph's logical root (used only for labeling the
/// result; every task in `all_tasks` still runs).
pub struct DagInput {
    /// Every task admitted into this run.
    pub all_tasks: Vec<AgentConfig>,
    /// The root task's ID, carried through into `DAGResult`.
    pub root_task_id: TaskId,
}

/// Outcome of a full DAG run.
pub struct DagResult {
    /// The root task ID this run was launched for.
    pub root: TaskId,
    /// Tasks that completed, successfully or not, keyed by ID.
    pub completed: HashMap<TaskId, TaskOutcome>,
    /// IDs of tasks that ran and failed (not upstream-skipped).
    pub failed: Vec<TaskId>,
    /// Wall-clock time the run took.
    pub completion_time: Duration,
    /// True if every admitted task reached a terminal `Completed` state
    /// with `success == true`.
    pub all_tasks_completed: bool,
}

/// Runs every task in `input` to completion via round-based ready-set
/// dispatch, launching all tasks whose dependencies are satisfied in
/// parallel each round and repeating until the graph drains or stalls.
pub async fn run_dag<F, Fut>(
    input: DagInput,
    max_concurrent: usize,
    dependency_failure_policy: crate::config::DependencyFailurePolicy,
    run_task: F,
) -> Result<DagResult>
where
    F: Fn(TaskId) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = AgentResult> + Send,
{
    let graph = TaskGraph::build(input.all_tasks)?;
    let scheduler = Scheduler::new(max_concurrent, dependency_failure_policy);
    let _start = tokio::time::Instant::now();
    let (completed, metrics) = scheduler
        .run(&graph, &SchedulerCallbacks::default(), run_task)
        .await?;

    let failed: Vec<TaskId> = completed
        .iter()
        .filter_map(|(id, outcome)| match outcome {
            TaskOutcome::Completed(result) if !result.success => Some(id.clone()),
            _ => None,
        })
        .collect();

    let all_tasks_completed = completed.values().all(|outcome| {
        matches!(outcome, TaskOutcome::Completed(result) if result.success)
    });

    Ok(DagResult {
        root: input.root_task_id,
        completed,
        failed,
        completion_time: metrics.wall_duration,
        all_tasks_completed,
    })
}

/// Worker-driven seam for the six-gate enhanced saga: each method maps
/// to one gate in the pipeline spec.md §4.9 describes (Bootstrap and
/// Commit/Revert are handled by the lifecycle coordinator and working
/// copy manager directly, not through this trait).
#[async_trait]
pub trait EnhancedTaskPipeline: Send + Sync {
    /// GenTests: ask the worker to propose tests for `requirement`.
    async fn generate_tests(&self, requirement: &Requirement) -> Result<Vec<TestCase>>;
    /// VerifyRED: compile and run the declared tests with no
    /// implementation present, expecting failures.
    async fn run_declared_tests(&self) -> Result<crate::domain::TestResult>;
    /// GenImplementation: ask the worker to implement `requirement`.
    async fn generate_implementation(&self, requirement: &Requirement) -> Result<Vec<ModifiedFile>>;
    /// VerifyGREEN: run the same tests again after implementation.
    async fn run_tests_again(&self) -> Result<crate::domain::TestResult>;
    /// MultiReview: collect one vote per reviewer.
    async fn collect_reviews(&self, required_reviewer_count: usize) -> Result<Vec<ReviewVote>>;
}

/// A single gate's outcome in the enhanced saga, for callers that want
/// to inspect where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancedStage {
    /// Bootstrapping the cell.
    Bootstrap,
    /// Acquiring file locks on the task's declared scope.
    AcquireLocks,
    /// Generating tests.
    GenTests,
    /// Linting generated tests for clarity (G1).
    LintTests,
    /// Verifying the declared tests fail before implementation exists.
    VerifyRed,
    /// Generating the implementation.
    GenImplementation,
    /// Verifying the declared tests pass after implementation.
    VerifyGreen,
    /// Running the G1-G5 verification gate chain over the green run.
    VerifyGates,
    /// Collecting and aggregating reviewer votes.
    MultiReview,
    /// Committing the working copy.
    Commit,
}

/// Result of one enhanced saga run.
pub enum EnhancedOutcome {
    /// Every gate passed and the working copy was committed.
    Committed {
        /// Tests the worker declared for this task.
        tests: Vec<TestCase>,
        /// Files the implementation touched.
        modified: Vec<ModifiedFile>,
        /// Results from the G1-G5 verification gate chain.
        gate_results: Vec<GateResult>,
    },
    /// A gate failed; the stage it failed at and why are reported. The
    /// working copy was reverted and the cell torn down.
    Failed {
        /// The stage that failed.
        stage: EnhancedStage,
        /// Human-readable reason.
        reason: String,
    },
}

enum SagaStep {
    ReleaseLocks(Vec<String>),
    TeardownCell(#[allow(dead_code)] CellId),
}

/// Runs the six-gate enhanced saga for a single task: bootstrap, lock
/// the task's declared file scope, generate tests, lint them, verify
/// red, implement, verify green, run the G1-G5 verification chain,
/// collect reviews, then commit. On success a success pattern is
/// appended to `learning`. Any intermediate failure reverts the working
/// copy and unwinds every compensation (locks, then cell) in reverse
/// order.
pub async fn run_enhanced_task<P: EnhancedTaskPipeline>(
    coordinator: &CellLifecycleCoordinator,
    locks: &FileLockRegistry,
    pipeline: &P,
    cell_id: CellId,
    branch: &str,
    requirement: &Requirement,
    locked_paths: &[String],
    holder: &str,
    lock_ttl: Duration,
    required_reviewer_count: usize,
    learning: &LearningSink,
) -> Result<EnhancedOutcome> {
    let mut compensations: Vec<SagaStep> = Vec::new();

    let cell = match coordinator.bootstrap(cell_id.clone(), branch).await {
        Ok(cell) => cell,
        Err(e) => return Ok(EnhancedOutcome::Failed {
            stage: EnhancedStage::Bootstrap,
            reason: e.to_string(),
        }),
    };
    compensations.push(SagaStep::TeardownCell(cell_id.clone()));

    let mut acquired = Vec::with_capacity(locked_paths.len());
    for path in locked_paths {
        match locks
            .acquire(LockRequest {
                path: path.clone(),
                holder: holder.to_string(),
                exclusive: true,
                ttl: lock_ttl,
            })
            .await
        {
            Ok(_) => acquired.push(path.clone()),
            Err(e) => {
                compensations.push(SagaStep::ReleaseLocks(acquired));
                unwind(coordinator, locks, compensations, &cell, holder).await;
                return Ok(EnhancedOutcome::Failed {
                    stage: EnhancedStage::AcquireLocks,
                    reason: e.to_string(),
                });
            }
        }
    }
    compensations.push(SagaStep::ReleaseLocks(acquired.clone()));

    let tests = match pipeline.generate_tests(requirement).await {
        Ok(tests) => tests,
        Err(e) => {
            unwind(coordinator, locks, compensations, &cell, holder).await;
            return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::GenTests, reason: e.to_string() });
        }
    };

    let lint: LintReport = slices::lint_tests(&tests);
    if !lint.passed {
        unwind(coordinator, locks, compensations, &cell, holder).await;
        return Ok(EnhancedOutcome::Failed {
            stage: EnhancedStage::LintTests,
            reason: format!("{} test name(s) failed clarity review", lint.violations.len()),
        });
    }

    let red = match pipeline.run_declared_tests().await {
        Ok(result) => result,
        Err(e) => {
            unwind(coordinator, locks, compensations, &cell, holder).await;
            return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::VerifyRed, reason: e.to_string() });
        }
    };
    if let Err(reason) = slices::verify_red(&red) {
        unwind(coordinator, locks, compensations, &cell, holder).await;
        return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::VerifyRed, reason });
    }

    let modified = match pipeline.generate_implementation(requirement).await {
        Ok(files) => files,
        Err(e) => {
            unwind(coordinator, locks, compensations, &cell, holder).await;
            return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::GenImplementation, reason: e.to_string() });
        }
    };

    let green = match pipeline.run_tests_again().await {
        Ok(result) => result,
        Err(e) => {
            coordinator.working_copies().revert(&cell.working_copy_id).await.ok();
            unwind(coordinator, locks, compensations, &cell, holder).await;
            return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::VerifyGreen, reason: e.to_string() });
        }
    };
    if let Err(reason) = slices::verify_green(&green) {
        coordinator.working_copies().revert(&cell.working_copy_id).await.ok();
        unwind(coordinator, locks, compensations, &cell, holder).await;
        return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::VerifyGreen, reason });
    }

    let gate_results = match run_verification_gates(requirement, &tests, &green, &modified).await {
        Ok(results) => results,
        Err(e) => {
            coordinator.working_copies().revert(&cell.working_copy_id).await.ok();
            unwind(coordinator, locks, compensations, &cell, holder).await;
            return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::VerifyGates, reason: e.to_string() });
        }
    };

    let votes = match pipeline.collect_reviews(required_reviewer_count).await {
        Ok(votes) => votes,
        Err(e) => {
            coordinator.working_copies().revert(&cell.working_copy_id).await.ok();
            unwind(coordinator, locks, compensations, &cell, holder).await;
            return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::MultiReview, reason: e.to_string() });
        }
    };
    if slices::aggregate_reviews(&votes) != ReviewOutcome::Approved {
        coordinator.working_copies().revert(&cell.working_copy_id).await.ok();
        unwind(coordinator, locks, compensations, &cell, holder).await;
        return Ok(EnhancedOutcome::Failed {
            stage: EnhancedStage::MultiReview,
            reason: "reviewers did not reach a majority approval".to_string(),
        });
    }

    let commit_message = format!("implement {}", requirement.task_id);
    if let Err(e) = coordinator
        .working_copies()
        .commit(&cell.working_copy_id, &commit_message)
        .await
    {
        unwind(coordinator, locks, compensations, &cell, holder).await;
        return Ok(EnhancedOutcome::Failed { stage: EnhancedStage::Commit, reason: e.to_string() });
    }

    learning
        .record(requirement.task_id.clone(), format!("{} gate(s) passed", gate_results.len()))
        .await;

    unwind(coordinator, locks, compensations, &cell, holder).await;
    Ok(EnhancedOutcome::Committed { tests, modified, gate_results })
}

/// Runs the G1-G5 verification gate chain over the green test run and
/// the implementation it covers, short-circuiting at the first failure
/// the same way `gates::run_chain` does for any other caller. G2 only
/// joins the chain when the worker actually produced a compiled test
/// binary; this saga has no compiler of its own, so most runs skip it.
async fn run_verification_gates(
    requirement: &Requirement,
    tests: &[TestCase],
    green: &crate::domain::TestResult,
    modified: &[ModifiedFile],
) -> Result<Vec<GateResult>> {
    let declared_test_names: Vec<String> = tests.iter().map(|t| t.name.clone()).collect();
    let requirements_gate = RequirementsGate::new(requirement.clone(), declared_test_names, 0.5);

    let implementation_source = modified
        .iter()
        .map(|file| file.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let claim = format!("{} of {} declared tests passing", green.passed, green.total);
    let honesty_gate = HonestyGate::new(green.clone(), claim);

    let hard_work_gate =
        HardWorkGate::new(implementation_source.clone(), green.clone(), HardWorkConfig::default());

    let drift_gate = DriftGate::new(requirement.clone(), 0.5, 0.5, 1);
    drift_gate.on_tokens_consumed(1, &implementation_source);

    let mut gates: Vec<Box<dyn Gate + Sync>> = vec![
        Box::new(requirements_gate),
        Box::new(honesty_gate),
        Box::new(hard_work_gate),
        Box::new(drift_gate),
    ];

    if let Some(immutability_gate) = immutability_gate_for(modified) {
        gates.push(Box::new(immutability_gate));
    }

    let refs: Vec<&(dyn Gate + Sync)> = gates.iter().map(|gate| gate.as_ref()).collect();
    crate::gates::run_chain(&refs).await
}

/// G2 needs an on-disk test file and a compiled binary next to it; this
/// saga's worker-driven pipeline doesn't carry either one unless the
/// worker reported a `tests/...` file among its modified files and a
/// sibling binary already exists from a prior compile.
fn immutability_gate_for(modified: &[ModifiedFile]) -> Option<ImmutabilityGate> {
    let test_file = modified
        .iter()
        .find(|file| file.path.starts_with("tests") && file.path.exists())?;
    let binary_file = test_file.path.with_extension("");
    binary_file.exists().then(|| ImmutabilityGate::new(test_file.path.clone(), binary_file))
}

async fn unwind(
    coordinator: &CellLifecycleCoordinator,
    locks: &FileLockRegistry,
    compensations: Vec<SagaStep>,
    cell: &crate::domain::Cell,
    holder: &str,
) {
    for step in compensations.into_iter().rev() {
        match step {
            SagaStep::ReleaseLocks(paths) => {
                for path in paths {
                    if let Err(e) = locks.release(&path, holder).await {
                        tracing::warn!(%path, error = %e, "saga compensation: failed to release lock");
                    }
                }
            }
            SagaStep::TeardownCell(_) => {
                if let Err(e) = coordinator.teardown(cell).await {
                    tracing::warn!(cell_id = %cell.id, error = %e, "saga compensation: failed to tear down cell");
                }
            }
        }
    }
}
