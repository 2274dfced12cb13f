//! Success-pattern sink (SPEC_FULL.md §2 supplemental): an append-only
//! record of what worked, written to after every gate pipeline success
//! so later tasks can be primed with proven phrasing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::TaskId;

/// One recorded success: the task it came from and a short summary of
/// the approach that passed every gate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SuccessPattern {
    /// The task this pattern was recorded from.
    pub task_id: TaskId,
    /// Free-form summary of the winning approach.
    pub summary: String,
    /// When the pattern was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Append-only in-memory sink of success patterns. Persistence is out of
/// scope; a real deployment would flush this to the same store used for
/// the task registry.
#[derive(Clone)]
pub struct LearningSink {
    patterns: Arc<Mutex<Vec<SuccessPattern>>>,
}

impl Default for LearningSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LearningSink {
    /// Construct an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a success pattern for `task_id`.
    pub async fn record(&self, task_id: TaskId, summary: String) {
        self.patterns.lock().await.push(SuccessPattern {
            task_id,
            summary,
            recorded_at: Utc::now(),
        });
    }

    /// Every recorded pattern, oldest first.
    pub async fn all(&self) -> Vec<SuccessPattern> {
        self.patterns.lock().await.clone()
    }

    /// Patterns recorded for a specific task.
    pub async fn for_task(&self, task_id: &TaskId) -> Vec<SuccessPattern> {
        self.patterns
            .lock()
            .await
            .iter()
            .filter(|p| &p.task_id == task_id)
            .cloned()
            .collect()
    }
}
