//! Configuration surface (spec.md §6).
//!
//! Loading config from a file/CLI is out of scope for this crate; this
//! module only defines the validated value type and its defaults,
//! following the `zjj-core::ConfigBuilder` builder pattern.

use crate::error::{Error, Result};

/// Inclusive integer bounds for the port pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PortRange {
    /// Lowest allocatable port, inclusive.
    pub min: u16,
    /// Highest allocatable port, inclusive.
    pub max: u16,
}

impl PortRange {
    /// Number of ports covered by this range.
    #[must_use]
    pub const fn len(&self) -> u32 {
        (self.max as u32) - (self.min as u32) + 1
    }

    /// Whether the range covers zero ports (always false: `min..=max` is
    /// inclusive on both ends and construction validates `min <= max`).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// Orchestrator policy for how a task failure propagates to dependents
/// (spec.md §9 open question for §4.6, resolved as an explicit policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DependencyFailurePolicy {
    /// Dependents of a failed task are skipped and marked `UpstreamFailed`.
    #[default]
    SkipDependents,
    /// Dependents of a failed task are cancelled outright.
    CancelDependents,
}

/// Top-level configuration for a `cellforge-core` deployment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Port pool bounds.
    pub port_range: PortRange,
    /// Filesystem root under which working copies are created.
    pub working_copy_base: std::path::PathBuf,
    /// Filesystem root of the source repository being worked on.
    pub repo_dir: std::path::PathBuf,
    /// Cap on in-flight orchestrator tasks.
    pub max_concurrent: usize,
    /// Duration bound for a single merge-queue kill operation.
    pub kill_switch_timeout: std::time::Duration,
    /// Additional protected-branch exact names or `prefix/*` patterns.
    pub protected_branches_extra: Vec<String>,
    /// Identities allowed to kill any branch regardless of ownership.
    pub system_agents: Vec<String>,
    /// Default reviewer count for the multi-review gate.
    pub reviewers_count: usize,
    /// Per-gate deadline.
    pub gate_timeout: std::time::Duration,
    /// Tokens consumed between drift-alignment checks (G5).
    pub drift_token_budget: u64,
    /// G1 scenario-coverage pass threshold.
    pub coverage_threshold: f64,
    /// G5 alignment pass threshold.
    pub drift_alignment_threshold: f64,
    /// G5 acceptance-phrase coverage pass threshold.
    pub acceptance_coverage: f64,
    /// Policy applied when a task's dependency fails.
    pub dependency_failure_policy: DependencyFailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_range: PortRange {
                min: 9000,
                max: 9999,
            },
            working_copy_base: std::path::PathBuf::from(".cellforge/workcopies"),
            repo_dir: std::path::PathBuf::from("."),
            max_concurrent: 10,
            kill_switch_timeout: std::time::Duration::from_millis(500),
            protected_branches_extra: Vec::new(),
            system_agents: vec![
                "system".to_string(),
                "admin".to_string(),
                "coordinator".to_string(),
                "merge-queue".to_string(),
                "automated-test".to_string(),
            ],
            reviewers_count: 3,
            gate_timeout: std::time::Duration::from_secs(30),
            drift_token_budget: 500,
            coverage_threshold: 0.90,
            drift_alignment_threshold: 0.70,
            acceptance_coverage: 0.70,
            dependency_failure_policy: DependencyFailurePolicy::default(),
        }
    }
}

impl Config {
    /// Validate this configuration, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.port_range.min > self.port_range.max {
            return Err(Error::Other(
                "port_range.min must be <= port_range.max".into(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(Error::Other("max_concurrent must be >= 1".into()));
        }
        if self.reviewers_count == 0 {
            return Err(Error::Other("reviewers_count must be >= 1".into()));
        }
        for (name, value) in [
            ("coverage_threshold", self.coverage_threshold),
            ("drift_alignment_threshold", self.drift_alignment_threshold),
            ("acceptance_coverage", self.acceptance_coverage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Other(format!("{name} must be in [0.0, 1.0]")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn port_range_len() {
        let range = PortRange { min: 8000, max: 8002 };
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn rejects_inverted_port_range() {
        let mut cfg = Config::default();
        cfg.port_range = PortRange { min: 9999, max: 9000 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut cfg = Config::default();
        cfg.max_concurrent = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut cfg = Config::default();
        cfg.coverage_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn dependency_failure_policy_defaults_to_skip() {
        assert_eq!(
            DependencyFailurePolicy::default(),
            DependencyFailurePolicy::SkipDependents
        );
    }
}
