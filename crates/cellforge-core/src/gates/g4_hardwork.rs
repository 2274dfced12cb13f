//! G4 — Hard-Work Enforcement (spec.md §4.7).

use std::time::Instant;

use regex::RegexSet;

use crate::domain::{GateResult, TestResult};
use crate::Result;

use super::Gate;

/// Minimum non-comment, non-blank line count below which an
/// implementation is considered trivial.
#[derive(Debug, Clone, Copy)]
pub struct HardWorkConfig {
    /// Below this many substantive lines, an implementation fails on
    /// triviality (spec.md §9 open question, resolved as configurable).
    pub min_nontrivial_lines: usize,
}

impl Default for HardWorkConfig {
    fn default() -> Self {
        Self {
            min_nontrivial_lines: 10,
        }
    }
}

fn stub_patterns() -> RegexSet {
    RegexSet::new([
        r"(?i)\bpanic!\s*\(",
        r"(?i)\btodo!\s*\(",
        r"(?i)\bunimplemented!\s*\(",
        r"(?i)\bnot\s+implemented\b",
        r"(?i)//\s*TODO",
        r"\breturn\s+nil\s*;?\s*$",
        r"return\s+(0|false|\x22\x22|\[\]|\{\})\s*;?\s*$",
        r"\{\s*\}",
    ])
    .expect("valid stub regex set")
}

fn cheating_patterns() -> RegexSet {
    RegexSet::new([
        r"(?i)mock\w*\.patch",
        r"(?i)unittest\.mock",
        r"(?i)disable[_ ]?assert",
        r"(?i)os\._exit\s*\(\s*0\s*\)",
        r"(?i)sys\.exit\s*\(\s*0\s*\)",
        r"(?i)process\.exit\s*\(\s*0\s*\)",
        r"(?i)std::process::exit\s*\(\s*0\s*\)",
        r"(?i)SKIP_TESTS",
    ])
    .expect("valid cheating regex set")
}

fn disabled_test_patterns() -> RegexSet {
    RegexSet::new([
        r"(?i)#\[ignore\]",
        r"(?i)\bskip\s*\(",
        r"(?i)\bxit\s*\(",
        r"(?i)\bxtest\s*\(",
        r"(?i)\bxdescribe\s*\(",
    ])
    .expect("valid disabled-test regex set")
}

fn substantive_line_count(source: &str) -> usize {
    source
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("//") && !trimmed.starts_with('#')
        })
        .count()
}

/// Detects stub/cheating/disabled-test/triviality patterns in an
/// implementation's source.
pub struct HardWorkGate {
    implementation_source: String,
    test_result: TestResult,
    config: HardWorkConfig,
}

impl HardWorkGate {
    /// Construct the gate over an implementation's source and test result.
    #[must_use]
    pub fn new(implementation_source: String, test_result: TestResult, config: HardWorkConfig) -> Self {
        Self {
            implementation_source,
            test_result,
            config,
        }
    }
}

#[async_trait::async_trait]
impl Gate for HardWorkGate {
    fn name(&self) -> &'static str {
        "HardWork"
    }

    async fn check(&self) -> Result<GateResult> {
        let start = Instant::now();
        let source = &self.implementation_source;

        let stub_detected = stub_patterns().is_match(source);
        let cheating_detected = cheating_patterns().is_match(source);
        let disabled_detected = disabled_test_patterns().is_match(source);
        let passing = self.test_result.is_passing();

        if cheating_detected {
            return Ok(GateResult::fail(
                self.name(),
                "cheating pattern detected in implementation",
                serde_json::json!({ "reason": "cheating" }),
                start.elapsed(),
            ));
        }

        if disabled_detected && !passing {
            return Ok(GateResult::fail(
                self.name(),
                "tests disabled while the run is still failing",
                serde_json::json!({ "reason": "disabled_tests_while_red" }),
                start.elapsed(),
            ));
        }

        if stub_detected && passing {
            return Ok(GateResult::fail(
                self.name(),
                "stub implementation reported as passing",
                serde_json::json!({ "reason": "stub_plus_green" }),
                start.elapsed(),
            ));
        }

        if stub_detected {
            // Stubs are acceptable while red: the implementation has not
            // claimed to satisfy the tests yet.
            return Ok(GateResult::ok(
                self.name(),
                "stub present but tests are not yet passing",
                start.elapsed(),
            ));
        }

        let substantive_lines = substantive_line_count(source);
        if substantive_lines < self.config.min_nontrivial_lines {
            return Ok(GateResult::fail(
                self.name(),
                format!(
                    "implementation has only {substantive_lines} substantive lines, below the {} minimum",
                    self.config.min_nontrivial_lines
                ),
                serde_json::json!({ "reason": "triviality", "lines": substantive_lines }),
                start.elapsed(),
            ));
        }

        Ok(GateResult::ok(self.name(), "implementation passes hard-work checks", start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_result() -> TestResult {
        TestResult {
            total: 3,
            passed: 3,
            failed: 0,
            raw_output: String::new(),
            failure_messages: vec![],
            exit_code: 0,
        }
    }

    fn failing_result() -> TestResult {
        TestResult {
            total: 3,
            passed: 1,
            failed: 2,
            raw_output: String::new(),
            failure_messages: vec!["x".into()],
            exit_code: 1,
        }
    }

    fn substantive_source(lines: usize) -> String {
        (0..lines).map(|i| format!("let x{i} = {i};")).collect::<Vec<_>>().join("\n")
    }

    #[tokio::test]
    async fn stub_while_green_fails() {
        let gate = HardWorkGate::new(
            "fn solve() { todo!() }".into(),
            passing_result(),
            HardWorkConfig::default(),
        );
        let result = gate.check().await.unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn stub_while_red_passes() {
        let gate = HardWorkGate::new(
            "fn solve() { panic!(\"not implemented\") }".into(),
            failing_result(),
            HardWorkConfig::default(),
        );
        let result = gate.check().await.unwrap();
        assert!(result.passed);
    }

    #[tokio::test]
    async fn cheating_pattern_always_fails() {
        let gate = HardWorkGate::new(
            format!("{}\nstd::process::exit(0);", substantive_source(20)),
            passing_result(),
            HardWorkConfig::default(),
        );
        let result = gate.check().await.unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn disabled_tests_while_failing_fails() {
        let gate = HardWorkGate::new(
            format!("{}\n#[ignore]\nfn test_x() {{}}", substantive_source(20)),
            failing_result(),
            HardWorkConfig::default(),
        );
        let result = gate.check().await.unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn triviality_fails_below_minimum_lines() {
        let gate = HardWorkGate::new(
            substantive_source(3),
            passing_result(),
            HardWorkConfig::default(),
        );
        let result = gate.check().await.unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn substantial_passing_implementation_passes() {
        let gate = HardWorkGate::new(
            substantive_source(20),
            passing_result(),
            HardWorkConfig::default(),
        );
        let result = gate.check().await.unwrap();
        assert!(result.passed);
    }
}
