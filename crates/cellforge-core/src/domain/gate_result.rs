//! `GateResult`, `AgentResult`, and `TestResult` (spec.md §3).

use super::identifiers::TaskId;

/// Outcome of a single gate `Check`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GateResult {
    /// Gate name (e.g. `"Requirements"`, `"EmpiricalHonesty"`).
    pub gate: String,
    /// Whether the gate passed.
    pub passed: bool,
    /// Short human-readable message.
    pub message: String,
    /// Structured detail, gate-specific.
    pub details: serde_json::Value,
    /// Wall-clock time spent in this gate.
    pub duration: std::time::Duration,
}

impl GateResult {
    /// Construct a passing result with no detail payload.
    #[must_use]
    pub fn ok(gate: &str, message: impl Into<String>, duration: std::time::Duration) -> Self {
        Self {
            gate: gate.to_string(),
            passed: true,
            message: message.into(),
            details: serde_json::Value::Null,
            duration,
        }
    }

    /// Construct a failing result carrying a detail payload.
    #[must_use]
    pub fn fail(
        gate: &str,
        message: impl Into<String>,
        details: serde_json::Value,
        duration: std::time::Duration,
    ) -> Self {
        Self {
            gate: gate.to_string(),
            passed: false,
            message: message.into(),
            details,
            duration,
        }
    }
}

/// Raw test-run output, the sole arbiter of correctness per spec.md §1.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TestResult {
    /// Total tests attempted.
    pub total: u32,
    /// Tests that passed.
    pub passed: u32,
    /// Tests that failed.
    pub failed: u32,
    /// Combined stdout + stderr of the test run.
    pub raw_output: String,
    /// Individual failure messages.
    pub failure_messages: Vec<String>,
    /// Process exit code of the test runner.
    pub exit_code: i32,
}

impl TestResult {
    /// `passed + failed <= total`, and `IsPassing() <=> failed == 0 && total > 0`.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.failed == 0 && self.total > 0
    }

    /// Fraction of attempted tests that passed, 0.0 when `total == 0`.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.passed) / f64::from(self.total)
        }
    }

    /// Invariant check used by property tests: `passed + failed <= total`.
    #[must_use]
    pub fn counts_are_consistent(&self) -> bool {
        self.passed + self.failed <= self.total
    }
}

/// Final, immutable record of one task's execution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentResult {
    /// The task this result belongs to.
    pub task_id: TaskId,
    /// Whether the task ultimately succeeded (passed every gate).
    pub success: bool,
    /// Wall-clock execution time.
    pub execution_time: std::time::Duration,
    /// The final test result observed, if any tests ran.
    pub test_result: Option<TestResult>,
    /// Ordered list of gate outcomes, in pipeline order.
    pub gate_results: Vec<GateResult>,
    /// Files the worker modified.
    pub modified_files: Vec<std::path::PathBuf>,
    /// Error kind, if the task failed for a non-gate reason.
    pub error_kind: Option<String>,
    /// Error message, if the task failed.
    pub error_message: Option<String>,
    /// Tokens consumed during execution.
    pub token_usage: u64,
    /// Number of retries performed.
    pub retry_count: u32,
    /// Summary recorded in the learning sink on success.
    pub success_pattern_summary: Option<String>,
    /// When this result was produced.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AgentResult {
    /// The first gate that failed, if any.
    #[must_use]
    pub fn first_failing_gate(&self) -> Option<&GateResult> {
        self.gate_results.iter().find(|g| !g.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_total_is_not_passing_and_has_zero_pass_rate() {
        let result = TestResult::default();
        assert!(!result.is_passing());
        assert_eq!(result.pass_rate(), 0.0);
    }

    #[test]
    fn passing_requires_zero_failed_and_nonzero_total() {
        let result = TestResult {
            total: 5,
            passed: 5,
            failed: 0,
            ..Default::default()
        };
        assert!(result.is_passing());
        assert_eq!(result.pass_rate(), 1.0);
    }

    #[test]
    fn counts_consistency_invariant() {
        let result = TestResult {
            total: 5,
            passed: 3,
            failed: 2,
            ..Default::default()
        };
        assert!(result.counts_are_consistent());

        let inconsistent = TestResult {
            total: 5,
            passed: 4,
            failed: 4,
            ..Default::default()
        };
        assert!(!inconsistent.counts_are_consistent());
    }

    #[test]
    fn first_failing_gate_is_located() {
        let result = AgentResult {
            task_id: TaskId::new("t1"),
            success: false,
            execution_time: std::time::Duration::from_secs(1),
            test_result: None,
            gate_results: vec![
                GateResult::ok("Requirements", "ok", std::time::Duration::ZERO),
                GateResult::fail(
                    "HardWork",
                    "stub detected",
                    serde_json::Value::Null,
                    std::time::Duration::ZERO,
                ),
            ],
            modified_files: vec![],
            error_kind: None,
            error_message: None,
            token_usage: 0,
            retry_count: 0,
            success_pattern_summary: None,
            timestamp: chrono::Utc::now(),
        };
        let failing = result.first_failing_gate().expect("one gate failed");
        assert_eq!(failing.gate, "HardWork");
    }
}
