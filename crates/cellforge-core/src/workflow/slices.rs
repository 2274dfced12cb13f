//! Test & Review Slices (SPEC_FULL.md §4.11): the structured building
//! blocks the workflow engine composes around a prompt-driven RED/GREEN
//! cycle and a multi-reviewer vote.

use crate::domain::{GateResult, Requirement, TestResult};
use crate::gates::g1_requirements::clarity_violation;

/// One agent-declared test, named and (optionally) bodied.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// The test's name, checked by G1's clarity rule.
    pub name: String,
    /// Source body, if the worker returned one.
    pub body: Option<String>,
}

/// Static lint result over a batch of declared tests.
#[derive(Debug, Clone)]
pub struct LintReport {
    /// True if every test name passed the clarity rule.
    pub passed: bool,
    /// Names that failed the clarity rule, with the reason.
    pub violations: Vec<(String, &'static str)>,
}

/// Requests a worker generate tests for `requirement`. The worker call
/// itself is out of scope here; this slice only shapes the result.
#[must_use]
pub fn tests_from_worker_response(names: Vec<String>) -> Vec<TestCase> {
    names.into_iter().map(|name| TestCase { name, body: None }).collect()
}

/// Check every declared test name against G1's clarity rule before
/// paying for a compile.
#[must_use]
pub fn lint_tests(tests: &[TestCase]) -> LintReport {
    let violations: Vec<(String, &'static str)> = tests
        .iter()
        .filter_map(|test| clarity_violation(&test.name).map(|reason| (test.name.clone(), reason)))
        .collect();
    LintReport {
        passed: violations.is_empty(),
        violations,
    }
}

/// A file the worker reported as modified while implementing a task.
#[derive(Debug, Clone)]
pub struct ModifiedFile {
    /// Path relative to the working copy root.
    pub path: std::path::PathBuf,
    /// Whether the worker reported this file as newly created.
    pub created: bool,
    /// The file's full contents after the edit, for G4/G5 to inspect
    /// without re-reading the working copy.
    pub content: String,
}

/// Asserts a test run taken before any implementation exists is
/// genuinely red: it must report at least one failure.
pub fn verify_red(result: &TestResult) -> Result<(), String> {
    if result.failed == 0 {
        Err("expected at least one failing test before implementation, got none".to_string())
    } else {
        Ok(())
    }
}

/// Asserts a test run taken after implementation is genuinely green.
pub fn verify_green(result: &TestResult) -> Result<(), String> {
    if result.is_passing() {
        Ok(())
    } else {
        Err(format!(
            "expected all tests passing, got {}/{} ({} failing)",
            result.passed, result.total, result.failed
        ))
    }
}

/// One reviewer's vote on a completed implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVote {
    /// The reviewer approves the implementation.
    Approve,
    /// The reviewer requests changes.
    RequestChanges,
}

/// The aggregated result of a multi-reviewer vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// A strict majority approved.
    Approved,
    /// A strict majority requested changes.
    ChangesRequested,
}

/// Majority-vote aggregation across `required_reviewer_count` reviewers.
#[must_use]
pub fn aggregate_reviews(votes: &[ReviewVote]) -> ReviewOutcome {
    let approvals = votes.iter().filter(|v| **v == ReviewVote::Approve).count();
    if approvals * 2 > votes.len() {
        ReviewOutcome::Approved
    } else {
        ReviewOutcome::ChangesRequested
    }
}

/// Combine the requirement and a G1 `GateResult` into one summary line,
/// mirroring the pass/fail-plus-summary shape used across the gate
/// pipeline's reports.
#[must_use]
pub fn summarize_gate_outcome(requirement: &Requirement, gate: &GateResult) -> String {
    if gate.passed {
        format!("{}: {} — {}", requirement.task_id, gate.gate, gate.message)
    } else {
        format!("{}: {} FAILED — {}", requirement.task_id, gate.gate, gate.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;

    #[test]
    fn lint_tests_flags_vague_names() {
        let tests = vec![TestCase {
            name: "test_handles_it_easily".into(),
            body: None,
        }];
        let report = lint_tests(&tests);
        assert!(!report.passed);
    }

    #[test]
    fn lint_tests_passes_clear_names() {
        let tests = vec![TestCase {
            name: "test_returns_error_on_invalid_input".into(),
            body: None,
        }];
        let report = lint_tests(&tests);
        assert!(report.passed);
    }

    #[test]
    fn verify_red_requires_at_least_one_failure() {
        let passing = TestResult {
            total: 3,
            passed: 3,
            failed: 0,
            ..Default::default()
        };
        assert!(verify_red(&passing).is_err());
    }

    #[test]
    fn verify_green_requires_full_pass() {
        let failing = TestResult {
            total: 3,
            passed: 2,
            failed: 1,
            ..Default::default()
        };
        assert!(verify_green(&failing).is_err());
    }

    #[test]
    fn aggregate_reviews_requires_strict_majority() {
        assert_eq!(
            aggregate_reviews(&[ReviewVote::Approve, ReviewVote::Approve, ReviewVote::RequestChanges]),
            ReviewOutcome::Approved
        );
        assert_eq!(
            aggregate_reviews(&[ReviewVote::Approve, ReviewVote::RequestChanges]),
            ReviewOutcome::ChangesRequested
        );
    }

    #[test]
    fn summarize_gate_outcome_marks_failures() {
        let requirement = Requirement {
            task_id: TaskId::new("t1"),
            title: "x".into(),
            description: "x".into(),
            acceptance: String::new(),
            scenarios: vec![],
            edge_cases: vec![],
        };
        let gate = GateResult::fail("HardWork", "stub detected", serde_json::Value::Null, std::time::Duration::ZERO);
        let summary = summarize_gate_outcome(&requirement, &gate);
        assert!(summary.contains("FAILED"));
    }
}
