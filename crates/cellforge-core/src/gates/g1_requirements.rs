//! G1 — Requirements Verification (spec.md §4.7).

use std::collections::HashSet;
use std::time::Instant;

use crate::domain::{GateResult, Requirement};
use crate::Result;

use super::Gate;

const VAGUE_WORDS: &[&str] = &[
    "easily", "quickly", "properly", "nicely", "well", "maybe", "possibly", "sometimes",
    "probably",
];

const OUTCOME_KEYWORDS: &[&str] = &[
    "success", "fail", "error", "valid", "invalid", "returns", "should", "must", "empty", "nil",
    "panic", "timeout",
];

/// Checks one declared test name against the clarity rule: vague
/// wording, or no outcome keyword at all. Shared with
/// `workflow::slices::lint_tests`, which runs the same check before a
/// single test is compiled.
pub(crate) fn clarity_violation(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    if VAGUE_WORDS.iter().any(|w| lower.contains(w)) {
        return Some("contains a vague word");
    }
    if !OUTCOME_KEYWORDS.iter().any(|w| lower.contains(w)) {
        return Some("missing an outcome keyword");
    }
    None
}

/// Verifies that agent-declared test names adequately cover a task's
/// scenarios and are clearly named.
pub struct RequirementsGate {
    requirement: Requirement,
    declared_tests: Vec<String>,
    coverage_threshold: f64,
}

impl RequirementsGate {
    /// Construct the gate for one task's requirement and declared tests.
    #[must_use]
    pub fn new(requirement: Requirement, declared_tests: Vec<String>, coverage_threshold: f64) -> Self {
        Self {
            requirement,
            declared_tests,
            coverage_threshold,
        }
    }

    fn scenario_covered(&self, scenario: &str) -> bool {
        let scenario_lower = scenario.to_lowercase();
        let scenario_words: HashSet<&str> = scenario_lower
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .collect();

        self.declared_tests.iter().any(|test| {
            let test_lower = test.to_lowercase();
            if test_lower.contains(&scenario_lower) {
                return true;
            }
            if scenario_words.is_empty() {
                return false;
            }
            let test_words: HashSet<&str> = test_lower.split(|c: char| !c.is_alphanumeric()).collect();
            let shared = scenario_words.iter().filter(|w| test_words.contains(*w)).count();
            (shared as f64 / scenario_words.len() as f64) >= 0.60
        })
    }

    fn clarity_violations(&self) -> Vec<String> {
        self.declared_tests
            .iter()
            .filter(|test| clarity_violation(test).is_some())
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl Gate for RequirementsGate {
    fn name(&self) -> &'static str {
        "Requirements"
    }

    async fn check(&self) -> Result<GateResult> {
        let start = Instant::now();

        if self.declared_tests.is_empty() {
            return Ok(GateResult::fail(
                self.name(),
                "no tests declared",
                serde_json::json!({}),
                start.elapsed(),
            ));
        }

        let covered = self
            .requirement
            .scenarios
            .iter()
            .filter(|s| self.scenario_covered(s))
            .count();
        let coverage = if self.requirement.scenarios.is_empty() {
            1.0
        } else {
            covered as f64 / self.requirement.scenarios.len() as f64
        };
        if coverage < self.coverage_threshold {
            return Ok(GateResult::fail(
                self.name(),
                format!(
                    "scenario coverage {:.2} below threshold {:.2}",
                    coverage, self.coverage_threshold
                ),
                serde_json::json!({ "coverage": coverage }),
                start.elapsed(),
            ));
        }

        let clarity_violations = self.clarity_violations();
        if !clarity_violations.is_empty() {
            return Ok(GateResult::fail(
                self.name(),
                "test names are vague or lack an outcome keyword",
                serde_json::json!({ "violations": clarity_violations }),
                start.elapsed(),
            ));
        }

        Ok(GateResult::ok(self.name(), "requirements satisfied", start.elapsed()))
    }
}
