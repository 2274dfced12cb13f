//! G3 — Empirical Honesty (spec.md §4.7).

use std::time::Instant;

use crate::domain::{GateResult, TestResult};
use crate::Result;

use super::Gate;

const SUCCESS_CLAIM_WORDS: &[&str] = &[
    "success",
    "passing",
    "complete",
    "done",
    "finished",
    "all tests pass",
    "works",
    "implemented",
];

const MAX_RAW_OUTPUT_CHARS: usize = 500;

/// Checks an agent's free-form claim against its actual `TestResult`.
pub struct HonestyGate {
    test_result: TestResult,
    claim: String,
}

impl HonestyGate {
    /// Construct the gate over a completed test run and the agent's claim.
    #[must_use]
    pub fn new(test_result: TestResult, claim: String) -> Self {
        Self { test_result, claim }
    }

    fn claim_overstates_success(&self) -> bool {
        let lower = self.claim.to_lowercase();
        SUCCESS_CLAIM_WORDS.iter().any(|w| lower.contains(w))
    }
}

#[async_trait::async_trait]
impl Gate for HonestyGate {
    fn name(&self) -> &'static str {
        "EmpiricalHonesty"
    }

    async fn check(&self) -> Result<GateResult> {
        let start = Instant::now();
        let result = &self.test_result;

        if !result.is_passing() && self.claim_overstates_success() {
            return Ok(self.report(start, "claim contradicts failing test result"));
        }

        if result.failed > 0 && result.raw_output.is_empty() && result.failure_messages.is_empty() {
            return Ok(self.report(
                start,
                "tests failed but neither raw output nor a failure list was provided",
            ));
        }

        if result.failed > 0 && result.exit_code == 0 {
            return Ok(self.report(
                start,
                "tests failed but the reported exit code is 0",
            ));
        }

        Ok(GateResult::ok(self.name(), "claim matches test results", start.elapsed()))
    }
}

impl HonestyGate {
    fn report(&self, start: Instant, message: &str) -> GateResult {
        let result = &self.test_result;
        let truncated: String = result.raw_output.chars().take(MAX_RAW_OUTPUT_CHARS).collect();
        GateResult::fail(
            self.name(),
            message,
            serde_json::json!({
                "claim": self.claim,
                "total": result.total,
                "passed": result.passed,
                "failed": result.failed,
                "pass_rate": result.pass_rate(),
                "exit_code": result.exit_code,
                "raw_output_truncated": truncated,
                "failure_messages": result.failure_messages,
            }),
            start.elapsed(),
        )
    }
}
