//! `TaskSpec`, `AgentConfig`, and `Requirement` (spec.md §3).

use std::collections::BTreeSet;

use super::identifiers::TaskId;

/// Priority, 1 = highest .. 5 = lowest.
pub type Priority = u8;

/// An admitted unit of work. Immutable after admission.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskSpec {
    /// Unique ID among admitted tasks.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description, the source of G5's key terms.
    pub description: String,
    /// Semicolon-joinable acceptance criteria.
    pub acceptance_criteria: Vec<String>,
    /// Ordered scenario strings (used by G1 coverage and G5 drift).
    pub scenarios: Vec<String>,
    /// Edge-case strings.
    pub edge_cases: Vec<String>,
    /// IDs of tasks that must complete before this one may start.
    pub dependencies: BTreeSet<TaskId>,
    /// 1 (highest) .. 5 (lowest).
    pub priority: Priority,
    /// Free-form labels; `needs-parallel-review` and `high-complexity`
    /// have defined effects on `AgentConfig` derivation.
    pub labels: Vec<String>,
    /// Optional hint for expected token consumption.
    pub token_budget_hint: Option<u64>,
}

impl TaskSpec {
    /// Join acceptance criteria the way `Requirement::acceptance` expects.
    #[must_use]
    pub fn acceptance_string(&self) -> String {
        self.acceptance_criteria.join(";")
    }

    /// A read-only `Requirement` view for gate consumption.
    #[must_use]
    pub fn to_requirement(&self) -> Requirement {
        Requirement {
            task_id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            acceptance: self.acceptance_string(),
            scenarios: self.scenarios.clone(),
            edge_cases: self.edge_cases.clone(),
        }
    }
}

/// Derivation of `TaskSpec` adding gate/execution parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentConfig {
    /// The originating task.
    pub task: TaskSpec,
    /// Number of reviewers required by the multi-review gate.
    pub required_reviewer_count: usize,
    /// Maximum execution retries.
    pub max_retries: u32,
    /// Per-task timeout.
    pub timeout: std::time::Duration,
    /// The bound requirement gates check against.
    pub requirement: Requirement,
}

impl AgentConfig {
    /// Derive reviewer count and retry budget from priority, unless the
    /// labels `needs-parallel-review` (-> 3 reviewers) or
    /// `high-complexity` (-> 5 reviewers, 5 retries) override it.
    #[must_use]
    pub fn derive(task: TaskSpec, default_timeout: std::time::Duration) -> Self {
        let has_label = |name: &str| task.labels.iter().any(|l| l == name);

        let (mut reviewer_count, mut max_retries) = default_reviewer_and_retries(task.priority);

        if has_label("needs-parallel-review") {
            reviewer_count = 3;
        }
        if has_label("high-complexity") {
            reviewer_count = 5;
            max_retries = 5;
        }

        let requirement = task.to_requirement();
        Self {
            task,
            required_reviewer_count: reviewer_count,
            max_retries,
            timeout: default_timeout,
            requirement,
        }
    }
}

/// Deterministic priority -> (reviewers, retries) mapping absent label overrides.
#[must_use]
pub fn default_reviewer_and_retries(priority: Priority) -> (usize, u32) {
    match priority {
        1 => (3, 3),
        2 => (2, 3),
        3 => (2, 2),
        4 => (1, 2),
        _ => (1, 1),
    }
}

/// Read-only gate input derived from a `TaskSpec`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Requirement {
    /// The task this requirement binds to.
    pub task_id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Semicolon-separated acceptance criteria.
    pub acceptance: String,
    /// Ordered scenario strings.
    pub scenarios: Vec<String>,
    /// Edge-case strings.
    pub edge_cases: Vec<String>,
}

impl Requirement {
    /// Acceptance criteria split back into individual phrases.
    #[must_use]
    pub fn acceptance_phrases(&self) -> Vec<&str> {
        self.acceptance
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}
