//! Merge-Queue Kill-Switch (spec.md §4.10): an in-memory registry of
//! `SpeculativeBranch`es with a validated, idempotent kill operation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{BranchId, BranchStatus, SpeculativeBranch};
use crate::{Error, Result};

const EXACT_PROTECTED: &[&str] = &["main", "master", "develop"];
const PREFIX_PROTECTED: &[&str] = &["release/", "hotfix/", "production/"];

const PRIVILEGED_REQUESTERS: &[&str] = &[
    "system",
    "admin",
    "coordinator",
    "merge-queue",
    "automated-test",
];

/// Seam for notifying external systems a branch was killed. Notifier
/// errors are logged, never fatal (spec.md §4.10).
#[async_trait::async_trait]
pub trait KillNotifier: Send + Sync {
    /// Called after a branch transitions to `Killed`.
    async fn notify(&self, branch_id: &BranchId, reason: &str);
}

/// Non-mutating snapshot of the queue's overall health.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Total branches currently tracked.
    pub total_branches: usize,
    /// Branches in each status.
    pub by_status: HashMap<&'static str, usize>,
    /// Total kills performed since this registry was constructed.
    pub total_kills: u64,
}

/// A cascade-kill failure: one entry per branch that could not be
/// killed, with the underlying validation error.
#[derive(Debug, thiserror::Error)]
#[error("cascade kill encountered {} failure(s)", .0.len())]
pub struct CascadeError(pub Vec<(BranchId, Error)>);

/// `kill_dependents`'s two distinct failure modes: the parent branch
/// itself rejected the request, or the parent was fine but one or more
/// descendants couldn't be killed (spec.md §4.10's `(ValidationError?,
/// CascadeError?)` pair, collapsed into one `Result` rather than two
/// optionals).
#[derive(Debug, thiserror::Error)]
pub enum KillDependentsError {
    /// The parent branch failed its own validation; no descendant was
    /// touched.
    #[error("parent branch validation failed: {0}")]
    Validation(#[from] Error),
    /// The parent validated; these descendants failed to kill.
    #[error(transparent)]
    Cascade(#[from] CascadeError),
}

struct State {
    branches: HashMap<BranchId, SpeculativeBranch>,
    total_kills: u64,
}

/// Tracks speculative branches and enforces the kill-switch's validation
/// sequence before any branch is marked killed.
#[derive(Clone)]
pub struct MergeQueue {
    state: Arc<Mutex<State>>,
    notifier: Option<Arc<dyn KillNotifier>>,
    protected_branches_extra: Vec<String>,
}

impl MergeQueue {
    /// Construct an empty queue, optionally with extra protected-branch
    /// patterns and a kill notifier.
    #[must_use]
    pub fn new(protected_branches_extra: Vec<String>, notifier: Option<Arc<dyn KillNotifier>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                branches: HashMap::new(),
                total_kills: 0,
            })),
            notifier,
            protected_branches_extra,
        }
    }

    /// Register a new speculative branch.
    pub async fn insert(&self, branch: SpeculativeBranch) {
        self.state.lock().await.branches.insert(branch.id.clone(), branch);
    }

    /// Fetch a branch by ID.
    pub async fn get(&self, id: &BranchId) -> Option<SpeculativeBranch> {
        self.state.lock().await.branches.get(id).cloned()
    }

    fn is_protected(&self, name: &str) -> bool {
        if EXACT_PROTECTED.contains(&name) {
            return true;
        }
        if PREFIX_PROTECTED.iter().any(|p| name.starts_with(p)) {
            return true;
        }
        self.protected_branches_extra.iter().any(|pattern| {
            pattern
                .strip_suffix("/*")
                .map_or(pattern == name, |prefix| name.starts_with(&format!("{prefix}/")))
        })
    }

    fn validate(&self, branch: &SpeculativeBranch, requesting_agent: &str) -> Result<()> {
        if self.is_protected(branch.id.as_str()) {
            return Err(Error::Validation {
                code: "BRANCH_PROTECTED",
                message: format!("branch '{}' is protected", branch.id),
            });
        }
        if !matches!(
            branch.status,
            BranchStatus::Pending | BranchStatus::Testing | BranchStatus::Failed | BranchStatus::Passed
        ) {
            return Err(Error::Validation {
                code: "INVALID_STATUS",
                message: format!("branch '{}' has status {:?}", branch.id, branch.status),
            });
        }
        if branch.has_pending_work() {
            return Err(Error::Validation {
                code: "PENDING_WORK",
                message: format!("branch '{}' has active workflows, containers, or pending tests", branch.id),
            });
        }
        let is_privileged = PRIVILEGED_REQUESTERS.contains(&requesting_agent);
        let is_owner = branch.first_change_agent() == Some(requesting_agent);
        if !is_privileged && !is_owner {
            return Err(Error::Validation {
                code: "OWNERSHIP_MISMATCH",
                message: format!(
                    "'{requesting_agent}' may not kill a branch it did not create"
                ),
            });
        }
        Ok(())
    }

    /// Validate and, if all checks pass, kill `id`. Idempotent: killing
    /// an already-killed branch succeeds without incrementing the kill
    /// counter again. Runs inside a bounded-duration context; exceeding
    /// `timeout` reports `ValidationTimeout`.
    pub async fn kill_failed_branch(
        &self,
        id: &BranchId,
        reason: &str,
        requesting_agent: &str,
        timeout: std::time::Duration,
    ) -> Result<()> {
        tokio::time::timeout(timeout, self.kill_inner(id, reason, requesting_agent))
            .await
            .map_err(|_| Error::Validation {
                code: "VALIDATION_TIMEOUT",
                message: format!("kill of '{id}' exceeded {timeout:?}"),
            })?
    }

    async fn kill_inner(&self, id: &BranchId, reason: &str, requesting_agent: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let branch = state
            .branches
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Validation {
                code: "BRANCH_NOT_FOUND",
                message: format!("branch '{id}' does not exist"),
            })?;

        if branch.status.is_killed() {
            return Ok(());
        }

        self.validate(&branch, requesting_agent)?;

        let entry = state.branches.get_mut(id).expect("checked above");
        entry.status = BranchStatus::Killed;
        entry.killed_at = Some(Utc::now());
        entry.kill_reason = Some(reason.to_string());
        state.total_kills += 1;
        drop(state);

        if let Some(notifier) = &self.notifier {
            notifier.notify(id, reason).await;
        }
        Ok(())
    }

    /// Validate `id` itself, then kill every branch in its transitive
    /// children closure, accumulating individual failures rather than
    /// aborting the cascade. `id` is never killed by this call — only
    /// validated, so a protected or not-found parent surfaces as a
    /// dedicated `Validation` error rather than a cascade entry.
    pub async fn kill_dependents(
        &self,
        id: &BranchId,
        reason: &str,
        requesting_agent: &str,
        timeout: std::time::Duration,
    ) -> std::result::Result<(), KillDependentsError> {
        let parent = self.get(id).await.ok_or_else(|| Error::Validation {
            code: "BRANCH_NOT_FOUND",
            message: format!("branch '{id}' does not exist"),
        })?;
        self.validate(&parent, requesting_agent)?;

        let mut failures = Vec::new();
        let mut frontier = parent.children_ids.clone();
        while let Some(current) = frontier.pop() {
            let children = self
                .get(&current)
                .await
                .map(|b| b.children_ids)
                .unwrap_or_default();
            if let Err(e) = self
                .kill_failed_branch(&current, reason, requesting_agent, timeout)
                .await
            {
                failures.push((current, e));
            }
            frontier.extend(children);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(KillDependentsError::Cascade(CascadeError(failures)))
        }
    }

    /// Non-mutating snapshot of overall queue health.
    pub async fn health_report(&self) -> HealthReport {
        let state = self.state.lock().await;
        let mut by_status: HashMap<&'static str, usize> = HashMap::new();
        for branch in state.branches.values() {
            let key = match branch.status {
                BranchStatus::Pending => "pending",
                BranchStatus::Testing => "testing",
                BranchStatus::Passed => "passed",
                BranchStatus::Failed => "failed",
                BranchStatus::Killed => "killed",
            };
            *by_status.entry(key).or_insert(0) += 1;
        }
        HealthReport {
            total_branches: state.branches.len(),
            by_status,
            total_kills: state.total_kills,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Change;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl KillNotifier for CountingNotifier {
        async fn notify(&self, _branch_id: &BranchId, _reason: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn branch_owned_by(id: &str, agent: &str) -> SpeculativeBranch {
        let mut branch = SpeculativeBranch::new_root(BranchId::new(id));
        branch.changes.push(Change {
            creating_agent: agent.to_string(),
            working_copy_path: "/tmp/wc".into(),
            files_touched: vec![],
        });
        branch.status = BranchStatus::Failed;
        branch
    }

    #[tokio::test]
    async fn kill_by_owner_succeeds_and_is_idempotent() {
        let queue = MergeQueue::new(vec![], None);
        queue.insert(branch_owned_by("b1", "agent-a")).await;
        queue
            .kill_failed_branch(&BranchId::new("b1"), "flaky", "agent-a", std::time::Duration::from_secs(1))
            .await
            .unwrap();
        let branch = queue.get(&BranchId::new("b1")).await.unwrap();
        assert_eq!(branch.status, BranchStatus::Killed);

        // second kill is a no-op success, not a second counter increment.
        queue
            .kill_failed_branch(&BranchId::new("b1"), "flaky", "agent-a", std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(queue.health_report().await.total_kills, 1);
    }

    #[tokio::test]
    async fn protected_branch_is_rejected() {
        let queue = MergeQueue::new(vec![], None);
        queue.insert(branch_owned_by("main", "agent-a")).await;
        let err = queue
            .kill_failed_branch(&BranchId::new("main"), "x", "agent-a", std::time::Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { code: "BRANCH_PROTECTED", .. }));
    }

    #[tokio::test]
    async fn extra_protected_prefix_is_honored() {
        let queue = MergeQueue::new(vec!["staging/*".to_string()], None);
        queue.insert(branch_owned_by("staging/feature-x", "agent-a")).await;
        let err = queue
            .kill_failed_branch(
                &BranchId::new("staging/feature-x"),
                "x",
                "agent-a",
                std::time::Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { code: "BRANCH_PROTECTED", .. }));
    }

    #[tokio::test]
    async fn ownership_mismatch_is_rejected_for_non_owner_non_privileged_agent() {
        let queue = MergeQueue::new(vec![], None);
        queue.insert(branch_owned_by("b1", "agent-a")).await;
        let err = queue
            .kill_failed_branch(&BranchId::new("b1"), "x", "agent-b", std::time::Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { code: "OWNERSHIP_MISMATCH", .. }));
    }

    #[tokio::test]
    async fn privileged_requester_may_kill_regardless_of_ownership() {
        let queue = MergeQueue::new(vec![], None);
        queue.insert(branch_owned_by("b1", "agent-a")).await;
        queue
            .kill_failed_branch(&BranchId::new("b1"), "x", "system", std::time::Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pending_work_blocks_the_kill() {
        let queue = MergeQueue::new(vec![], None);
        let mut branch = branch_owned_by("b1", "agent-a");
        branch.active_workflow_ids.push("wf-1".into());
        queue.insert(branch).await;
        let err = queue
            .kill_failed_branch(&BranchId::new("b1"), "x", "agent-a", std::time::Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { code: "PENDING_WORK", .. }));
    }

    #[tokio::test]
    async fn notifier_is_invoked_on_successful_kill() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = MergeQueue::new(vec![], Some(Arc::new(CountingNotifier(counter.clone()))));
        queue.insert(branch_owned_by("b1", "agent-a")).await;
        queue
            .kill_failed_branch(&BranchId::new("b1"), "x", "agent-a", std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cascade_kill_accumulates_failures_without_aborting() {
        let queue = MergeQueue::new(vec![], None);
        let mut root = branch_owned_by("root", "agent-a");
        root.children_ids.push(BranchId::new("child-mismatched-owner"));
        root.children_ids.push(BranchId::new("child-ok"));
        queue.insert(root).await;
        queue.insert(branch_owned_by("child-mismatched-owner", "agent-b")).await;
        queue.insert(branch_owned_by("child-ok", "agent-a")).await;

        let result = queue
            .kill_dependents(&BranchId::new("root"), "cascade", "agent-a", std::time::Duration::from_secs(1))
            .await;
        let err = match result.unwrap_err() {
            KillDependentsError::Cascade(e) => e,
            KillDependentsError::Validation(e) => panic!("unexpected validation failure: {e}"),
        };
        assert_eq!(err.0.len(), 1);
        assert_eq!(err.0[0].0, BranchId::new("child-mismatched-owner"));

        // the parent is validated, never killed, by this call.
        assert_eq!(
            queue.get(&BranchId::new("root")).await.unwrap().status,
            BranchStatus::Failed
        );
        assert_eq!(
            queue.get(&BranchId::new("child-ok")).await.unwrap().status,
            BranchStatus::Killed
        );
        assert_eq!(
            queue.get(&BranchId::new("child-mismatched-owner")).await.unwrap().status,
            BranchStatus::Failed
        );
    }

    #[tokio::test]
    async fn kill_dependents_rejects_a_protected_parent_without_touching_children() {
        let queue = MergeQueue::new(vec![], None);
        let mut root = branch_owned_by("main", "agent-a");
        root.children_ids.push(BranchId::new("child-ok"));
        queue.insert(root).await;
        queue.insert(branch_owned_by("child-ok", "agent-a")).await;

        let err = queue
            .kill_dependents(&BranchId::new("main"), "cascade", "agent-a", std::time::Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KillDependentsError::Validation(Error::Validation { code: "BRANCH_PROTECTED", .. })
        ));
        assert_eq!(
            queue.get(&BranchId::new("child-ok")).await.unwrap().status,
            BranchStatus::Failed
        );
    }

    #[tokio::test]
    async fn health_report_counts_by_status() {
        let queue = MergeQueue::new(vec![], None);
        queue.insert(branch_owned_by("b1", "agent-a")).await;
        queue.insert(SpeculativeBranch::new_root(BranchId::new("b2"))).await;
        let report = queue.health_report().await;
        assert_eq!(report.total_branches, 2);
        assert_eq!(report.by_status.get("failed"), Some(&1));
        assert_eq!(report.by_status.get("pending"), Some(&1));
    }
}
