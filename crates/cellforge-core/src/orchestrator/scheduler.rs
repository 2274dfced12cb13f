//! Wave-based scheduler over a `TaskGraph` (spec.md §4.6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::DependencyFailurePolicy;
use crate::domain::{AgentResult, TaskId};
use crate::{Error, Result};

use super::graph::TaskGraph;
use super::metrics::OrchestratorMetrics;

/// Final status recorded for one task after the run completes.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The task's agent ran and its result is attached.
    Completed(AgentResult),
    /// The task was skipped or cancelled because an upstream task failed.
    UpstreamFailed {
        /// The upstream task that caused this one to be skipped.
        failed_dependency: TaskId,
    },
}

/// Callbacks invoked as tasks complete. Callback errors are collected
/// but never abort the run.
pub struct SchedulerCallbacks {
    /// Invoked after a successful task.
    pub on_success: Option<Box<dyn Fn(&TaskId, &AgentResult) -> Result<()> + Send + Sync>>,
    /// Invoked after a failed task.
    pub on_failure: Option<Box<dyn Fn(&TaskId, &AgentResult) -> Result<()> + Send + Sync>>,
}

impl Default for SchedulerCallbacks {
    fn default() -> Self {
        Self {
            on_success: None,
            on_failure: None,
        }
    }
}

/// Drives the ready-wave loop over a `TaskGraph`, dispatching each ready
/// task through `run_task` within a bounded semaphore.
pub struct Scheduler {
    max_concurrent: usize,
    dependency_failure_policy: DependencyFailurePolicy,
}

impl Scheduler {
    /// Construct a scheduler bounded to `max_concurrent` in-flight tasks.
    #[must_use]
    pub fn new(max_concurrent: usize, dependency_failure_policy: DependencyFailurePolicy) -> Self {
        Self {
            max_concurrent,
            dependency_failure_policy,
        }
    }

    /// Run every task in `graph` to completion, dispatching ready waves
    /// through `run_task`. Fails with `Error::Stalled` if tasks remain but
    /// none are ready and none are in flight.
    pub async fn run<F, Fut>(
        &self,
        graph: &TaskGraph,
        callbacks: &SchedulerCallbacks,
        run_task: F,
    ) -> Result<(HashMap<TaskId, TaskOutcome>, OrchestratorMetrics)>
    where
        F: Fn(TaskId) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = AgentResult> + Send,
    {
        let total = graph.configs().len();
        let mut completed: HashSet<TaskId> = HashSet::new();
        let mut excluded: HashSet<TaskId> = HashSet::new();
        let mut outcomes: HashMap<TaskId, TaskOutcome> = HashMap::new();
        let mut metrics = OrchestratorMetrics::new(total);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let wall_start = tokio::time::Instant::now();

        loop {
            let ready = graph.ready_wave(&completed, &excluded);
            if ready.is_empty() {
                let remaining = total - completed.len() - excluded.len();
                if remaining == 0 {
                    break;
                }
                return Err(Error::Stalled(remaining));
            }

            let mut handles = Vec::with_capacity(ready.len());
            for task_id in ready {
                let semaphore = semaphore.clone();
                let task_id_for_run = task_id.clone();
                let fut = run_task(task_id_for_run);
                handles.push(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                    let start = tokio::time::Instant::now();
                    let result = fut.await;
                    (task_id, result, start.elapsed())
                });
            }

            let wave_results = futures::future::join_all(handles).await;
            for (task_id, result, duration) in wave_results {
                metrics.record(&task_id, &result, duration);
                if result.success {
                    completed.insert(task_id.clone());
                    if let Some(cb) = &callbacks.on_success {
                        let _ = cb(&task_id, &result);
                    }
                } else {
                    excluded.insert(task_id.clone());
                    if let Some(cb) = &callbacks.on_failure {
                        let _ = cb(&task_id, &result);
                    }
                    self.exclude_dependents(graph, &task_id, &mut excluded, &mut outcomes);
                }
                outcomes.insert(task_id, TaskOutcome::Completed(result));
            }
        }

        metrics.finalize(wall_start.elapsed());
        Ok((outcomes, metrics))
    }

    fn exclude_dependents(
        &self,
        graph: &TaskGraph,
        failed: &TaskId,
        excluded: &mut HashSet<TaskId>,
        outcomes: &mut HashMap<TaskId, TaskOutcome>,
    ) {
        let mut frontier = vec![failed.clone()];
        while let Some(id) = frontier.pop() {
            for dependent in graph.dependents_of(&id) {
                if excluded.insert(dependent.clone()) {
                    outcomes.insert(
                        dependent.clone(),
                        TaskOutcome::UpstreamFailed {
                            failed_dependency: failed.clone(),
                        },
                    );
                    if self.dependency_failure_policy == DependencyFailurePolicy::CancelDependents {
                        frontier.push(dependent.clone());
                    }
                }
            }
        }
    }
}
