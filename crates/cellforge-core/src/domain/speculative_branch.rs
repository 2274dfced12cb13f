//! `SpeculativeBranch`, stored arena-style in the merge queue's map
//! (spec.md §9: "parent and children recorded as ID fields, never object
//! references").

use super::identifiers::BranchId;

/// One agent's set of file changes on a speculative branch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Change {
    /// The agent identity that authored this change.
    pub creating_agent: String,
    /// The working-copy path the change was made in.
    pub working_copy_path: std::path::PathBuf,
    /// Files touched by this change.
    pub files_touched: Vec<std::path::PathBuf>,
}

/// Lifecycle status of a `SpeculativeBranch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BranchStatus {
    /// Queued, not yet tested.
    Pending,
    /// Currently under test.
    Testing,
    /// Tests passed; eligible to merge.
    Passed,
    /// Tests failed.
    Failed,
    /// Terminal: killed by the kill-switch.
    Killed,
}

impl BranchStatus {
    /// `killed` and `passed` are terminal in the monotone sense the
    /// invariant (spec.md §8 invariant 5) cares about: `killed` never
    /// transitions further.
    #[must_use]
    pub const fn is_killed(self) -> bool {
        matches!(self, Self::Killed)
    }
}

/// A tentative set of changes, tested in isolation, then promoted or killed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SpeculativeBranch {
    /// Unique ID.
    pub id: BranchId,
    /// Depth in the speculative tree (root = 0).
    pub depth: u32,
    /// Ordered changes contributed to this branch.
    pub changes: Vec<Change>,
    /// Current lifecycle status.
    pub status: BranchStatus,
    /// Parent branch ID, if any. `None` for roots.
    pub parent_id: Option<BranchId>,
    /// Direct child branch IDs.
    pub children_ids: Vec<BranchId>,
    /// Workflow engine IDs currently acting on this branch.
    pub active_workflow_ids: Vec<String>,
    /// Container/process IDs currently acting on this branch.
    pub active_container_ids: Vec<String>,
    /// Test results pending evaluation.
    pub pending_test_results: Vec<String>,
    /// When this branch was killed, if it was.
    pub killed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Why this branch was killed, if it was.
    pub kill_reason: Option<String>,
}

impl SpeculativeBranch {
    /// Construct a new, pending root branch with no parent.
    #[must_use]
    pub fn new_root(id: BranchId) -> Self {
        Self {
            id,
            depth: 0,
            changes: Vec::new(),
            status: BranchStatus::Pending,
            parent_id: None,
            children_ids: Vec::new(),
            active_workflow_ids: Vec::new(),
            active_container_ids: Vec::new(),
            pending_test_results: Vec::new(),
            killed_at: None,
            kill_reason: None,
        }
    }

    /// The agent that created the first change on this branch, if any.
    /// Used by the kill-switch's ownership check.
    #[must_use]
    pub fn first_change_agent(&self) -> Option<&str> {
        self.changes.first().map(|c| c.creating_agent.as_str())
    }

    /// Whether the branch currently has work in flight (active workflows
    /// or containers, or mid-test with resources attached).
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.active_workflow_ids.is_empty()
            || !self.active_container_ids.is_empty()
            || (self.status == BranchStatus::Testing && !self.pending_test_results.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_root_has_no_parent_and_is_pending() {
        let branch = SpeculativeBranch::new_root(BranchId::new("b1"));
        assert!(branch.parent_id.is_none());
        assert_eq!(branch.status, BranchStatus::Pending);
        assert!(branch.children_ids.is_empty());
    }

    #[test]
    fn first_change_agent_is_the_earliest_contributor() {
        let mut branch = SpeculativeBranch::new_root(BranchId::new("b1"));
        branch.changes.push(Change {
            creating_agent: "agent-a".into(),
            working_copy_path: "/tmp/a".into(),
            files_touched: vec![],
        });
        branch.changes.push(Change {
            creating_agent: "agent-b".into(),
            working_copy_path: "/tmp/b".into(),
            files_touched: vec![],
        });
        assert_eq!(branch.first_change_agent(), Some("agent-a"));
    }

    #[test]
    fn pending_work_detected_from_active_workflows() {
        let mut branch = SpeculativeBranch::new_root(BranchId::new("b1"));
        assert!(!branch.has_pending_work());
        branch.active_workflow_ids.push("wf-1".into());
        assert!(branch.has_pending_work());
    }

    #[test]
    fn killed_status_is_terminal() {
        assert!(BranchStatus::Killed.is_killed());
        assert!(!BranchStatus::Passed.is_killed());
    }
}
