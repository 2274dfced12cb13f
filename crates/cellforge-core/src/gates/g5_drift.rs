//! G5 — Requirement Drift Detection (spec.md §4.7).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;

use crate::domain::{DriftCheckpoint, GateResult, Requirement};
use crate::Result;

use super::Gate;

const STOP_WORDS: &[&str] = &[
    "the", "and", "with", "that", "this", "from", "have", "will", "should", "must", "into",
    "when", "then", "also", "which", "their", "about",
];

const SCOPE_CREEP_WORDS: &[&str] = &[
    "bonus",
    "extra",
    "additional",
    "optimization",
    "refactor",
    "cleanup",
    "restructure",
    "rename",
];

fn key_terms(description: &str) -> Vec<String> {
    let lower = description.to_lowercase();
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if word.len() <= 4 || STOP_WORDS.contains(&word) {
            continue;
        }
        if seen.insert(word.to_string()) {
            terms.push(word.to_string());
        }
        if terms.len() == 10 {
            break;
        }
    }
    terms
}

fn words_of(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn overlap_ratio(needle_words: &HashSet<String>, haystack: &str) -> f64 {
    if needle_words.is_empty() {
        return 1.0;
    }
    let haystack_words = words_of(haystack);
    let shared = needle_words.iter().filter(|w| haystack_words.contains(*w)).count();
    shared as f64 / needle_words.len() as f64
}

/// A single drift-alignment check against the current implementation.
pub struct AlignmentCheck {
    /// Fraction of key terms present in the implementation.
    pub coverage: f64,
    /// Whether enough acceptance phrases appear verbatim.
    pub acceptance_satisfied: bool,
    /// Scenarios whose word overlap with the implementation is below 50%.
    pub missing_scenarios: Vec<String>,
    /// Scope-creep words observed (non-fatal).
    pub scope_creep_warnings: Vec<String>,
}

impl AlignmentCheck {
    /// Whether this checkpoint passes G5's fail conditions.
    #[must_use]
    pub fn passes(&self, alignment_threshold: f64) -> bool {
        self.coverage >= alignment_threshold && self.acceptance_satisfied && self.missing_scenarios.is_empty()
    }
}

/// Token-budget-triggered drift checker for one task.
pub struct DriftGate {
    requirement: Requirement,
    alignment_threshold: f64,
    acceptance_threshold: f64,
    token_budget: u64,
    tokens_since_last_check: AtomicU64,
    checkpoints: Mutex<Vec<DriftCheckpoint>>,
}

impl DriftGate {
    /// Construct the gate for a requirement, checking alignment every
    /// `token_budget` tokens consumed.
    #[must_use]
    pub fn new(
        requirement: Requirement,
        alignment_threshold: f64,
        acceptance_threshold: f64,
        token_budget: u64,
    ) -> Self {
        Self {
            requirement,
            alignment_threshold,
            acceptance_threshold,
            token_budget,
            tokens_since_last_check: AtomicU64::new(0),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    /// Record token consumption, returning an alignment check if the
    /// budget threshold was crossed.
    pub fn on_tokens_consumed(&self, tokens: u64, implementation: &str) -> Option<AlignmentCheck> {
        let total = self.tokens_since_last_check.fetch_add(tokens, Ordering::SeqCst) + tokens;
        if total < self.token_budget {
            return None;
        }
        self.tokens_since_last_check.store(0, Ordering::SeqCst);
        Some(self.check_alignment(implementation, total))
    }

    fn check_alignment(&self, implementation: &str, tokens_used: u64) -> AlignmentCheck {
        let terms = key_terms(&self.requirement.description);
        let terms_present = terms
            .iter()
            .filter(|term| implementation.to_lowercase().contains(term.as_str()))
            .count();
        let coverage = if terms.is_empty() {
            1.0
        } else {
            terms_present as f64 / terms.len() as f64
        };

        let phrases = self.requirement.acceptance_phrases();
        let satisfied_phrases = phrases
            .iter()
            .filter(|phrase| implementation.to_lowercase().contains(&phrase.to_lowercase()))
            .count();
        let acceptance_satisfied = if phrases.is_empty() {
            true
        } else {
            (satisfied_phrases as f64 / phrases.len() as f64) >= self.acceptance_threshold
        };

        let missing_scenarios: Vec<String> = self
            .requirement
            .scenarios
            .iter()
            .filter(|scenario| overlap_ratio(&words_of(scenario), implementation) < 0.50)
            .cloned()
            .collect();

        let scope_creep_warnings: Vec<String> = SCOPE_CREEP_WORDS
            .iter()
            .filter(|w| implementation.to_lowercase().contains(*w))
            .map(|w| (*w).to_string())
            .collect();

        let check = AlignmentCheck {
            coverage,
            acceptance_satisfied,
            missing_scenarios,
            scope_creep_warnings,
        };

        let checkpoint = DriftCheckpoint {
            timestamp: Utc::now(),
            tokens_used,
            alignment_score: check.coverage,
            issues: check.missing_scenarios.clone(),
            passed: check.passes(self.alignment_threshold),
        };
        self.checkpoints.lock().unwrap_or_else(|e| e.into_inner()).push(checkpoint);

        check
    }

    /// All recorded drift checkpoints, in chronological order.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<DriftCheckpoint> {
        self.checkpoints.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Gate for DriftGate {
    fn name(&self) -> &'static str {
        "RequirementDrift"
    }

    async fn check(&self) -> Result<GateResult> {
        let start = Instant::now();
        let checkpoints = self.checkpoints();
        let Some(latest) = checkpoints.last() else {
            return Ok(GateResult::ok(self.name(), "no checkpoints recorded yet", start.elapsed()));
        };
        if latest.passed {
            Ok(GateResult::ok(self.name(), "implementation remains aligned", start.elapsed()))
        } else {
            Ok(GateResult::fail(
                self.name(),
                "implementation has drifted from requirements",
                serde_json::json!({ "checkpoint": latest }),
                start.elapsed(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement() -> Requirement {
        Requirement {
            task_id: crate::domain::TaskId::new("t1"),
            title: "Add retry logic".into(),
            description: "Add exponential backoff retry logic to the network client".into(),
            acceptance: "retries on failure;caps at three attempts".into(),
            scenarios: vec!["client retries on transient network failure".into()],
            edge_cases: vec![],
        }
    }

    #[test]
    fn triggers_a_checkpoint_once_the_budget_is_crossed() {
        let gate = DriftGate::new(requirement(), 0.70, 0.70, 500);
        assert!(gate.on_tokens_consumed(200, "").is_none());
        assert!(gate.on_tokens_consumed(200, "").is_none());
        assert!(gate.on_tokens_consumed(200, "retry backoff network client").is_some());
    }

    #[test]
    fn aligned_implementation_passes_all_three_conditions() {
        let gate = DriftGate::new(requirement(), 0.70, 0.70, 100);
        let check = gate
            .on_tokens_consumed(
                100,
                "exponential backoff retry logic network client retries on failure caps at three attempts client retries on transient network failure",
            )
            .unwrap();
        assert!(check.passes(0.70));
    }

    #[test]
    fn missing_scenario_fails_even_with_full_term_coverage() {
        let gate = DriftGate::new(requirement(), 0.70, 0.70, 100);
        let check = gate
            .on_tokens_consumed(
                100,
                "exponential backoff retry logic applied to the network client module",
            )
            .unwrap();
        assert!(!check.missing_scenarios.is_empty());
        assert!(!check.passes(0.70));
    }

    #[test]
    fn scope_creep_words_are_reported_but_non_fatal() {
        let gate = DriftGate::new(requirement(), 0.0, 0.0, 100);
        let check = gate
            .on_tokens_consumed(100, "refactor the retry logic as a bonus optimization")
            .unwrap();
        assert!(!check.scope_creep_warnings.is_empty());
    }

    #[tokio::test]
    async fn gate_check_reflects_latest_checkpoint() {
        let gate = DriftGate::new(requirement(), 0.70, 0.70, 100);
        gate.on_tokens_consumed(100, "unrelated implementation with no overlap at all").unwrap();
        let result = gate.check().await.unwrap();
        assert!(!result.passed);
    }
}
