//! Observable orchestrator metrics (spec.md §4.6).

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{AgentResult, TaskId};

/// Aggregate metrics for one orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorMetrics {
    /// Total tasks admitted into the run.
    pub total_tasks: usize,
    /// Tasks whose agent execution succeeded.
    pub success_count: usize,
    /// Tasks whose agent execution failed.
    pub failure_count: usize,
    /// Per-task wall-clock durations.
    pub task_durations: HashMap<TaskId, Duration>,
    /// Total tokens consumed across all tasks.
    pub aggregate_tokens: u64,
    /// Per-gate pass/fail counts, keyed by gate name.
    pub gate_pass_counts: HashMap<String, (u32, u32)>,
    /// Total wall-clock time for the run, set by `finalize`.
    pub wall_duration: Duration,
}

impl OrchestratorMetrics {
    /// Construct empty metrics for a run of `total_tasks` tasks.
    #[must_use]
    pub fn new(total_tasks: usize) -> Self {
        Self {
            total_tasks,
            success_count: 0,
            failure_count: 0,
            task_durations: HashMap::new(),
            aggregate_tokens: 0,
            gate_pass_counts: HashMap::new(),
            wall_duration: Duration::ZERO,
        }
    }

    /// Record one completed task's result.
    pub fn record(&mut self, task_id: &TaskId, result: &AgentResult, duration: Duration) {
        if result.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.task_durations.insert(task_id.clone(), duration);
        self.aggregate_tokens += result.token_usage;
        for gate in &result.gate_results {
            let entry = self.gate_pass_counts.entry(gate.gate.clone()).or_insert((0, 0));
            if gate.passed {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }

    /// Set the run's total wall-clock duration. Call once, after the run
    /// loop exits.
    pub fn finalize(&mut self, wall_duration: Duration) {
        self.wall_duration = wall_duration;
    }

    /// Mean per-task duration across every recorded task.
    #[must_use]
    pub fn mean_task_duration(&self) -> Duration {
        if self.task_durations.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.task_durations.values().sum();
        total / self.task_durations.len() as u32
    }

    /// Estimated parallel speedup: mean-duration × count ÷ wall-duration.
    #[must_use]
    pub fn parallel_speedup(&self) -> f64 {
        if self.wall_duration.is_zero() || self.task_durations.is_empty() {
            return 0.0;
        }
        let mean = self.mean_task_duration().as_secs_f64();
        let count = self.task_durations.len() as f64;
        (mean * count) / self.wall_duration.as_secs_f64()
    }

    /// Pass rate for a given gate name, `None` if the gate never ran.
    #[must_use]
    pub fn gate_pass_rate(&self, gate: &str) -> Option<f64> {
        let (passed, failed) = *self.gate_pass_counts.get(gate)?;
        let total = passed + failed;
        if total == 0 {
            None
        } else {
            Some(f64::from(passed) / f64::from(total))
        }
    }
}
