//! Crate-wide error taxonomy.
//!
//! Each component defines its own narrow error type where spec behavior
//! names one explicitly (`ExhaustedError`, `ConflictError`, ...); those
//! convert into this enum via `From` so callers crossing component
//! boundaries see one `Result<T, Error>` shape.

use thiserror::Error;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Component-level failure kinds, following the taxonomy in spec.md §7.
#[derive(Debug, Error)]
pub enum Error {
    /// A port pool, working-copy, or cell-process allocation failed
    /// because the resource is exhausted or already taken.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An operation referenced a resource that does not exist (an
    /// unallocated port, an absent lock, an unknown branch, ...).
    #[error("not found: {0}")]
    NotFound(String),

    /// Cell bootstrap failed part-way through the three-step transaction.
    #[error("cell bootstrap failed: {0}")]
    BootstrapFailed(String),

    /// The worker process failed a health probe or never became healthy.
    #[error("cell unhealthy: {0}")]
    CellUnhealthy(String),

    /// A file-lock acquisition conflicted with an existing active lock.
    #[error("lock conflict on {path}: held by {holder}{exclusive_note}")]
    LockConflict {
        /// The path pattern that was requested.
        path: String,
        /// The holder of the conflicting lock.
        holder: String,
        /// Precomputed `" (exclusive)"` / `""` suffix for display.
        exclusive_note: &'static str,
    },

    /// A lock operation referenced a lock the caller does not hold.
    #[error("lock not held: {0}")]
    LockNotHeld(String),

    /// Worker I/O failed in a way the adapter classifies as terminal.
    #[error("worker I/O error ({kind}): {message}")]
    WorkerIo {
        /// Classification: network, timeout, invalid-input, agent-error, unknown.
        kind: WorkerIoKind,
        /// Human-readable detail.
        message: String,
    },

    /// The task dependency graph contains a cycle.
    #[error("task graph has a cycle: {0}")]
    CyclicGraph(String),

    /// No task is ready and none is in flight, but tasks remain.
    #[error("orchestrator stalled: {0} task(s) remain uncompleted")]
    Stalled(usize),

    /// A gate in the verification pipeline failed.
    #[error("gate {gate} failed for task {task_id}: {message}")]
    GateFailed {
        /// Which gate failed (Requirements, TestImmutability, ...).
        gate: &'static str,
        /// The task under verification.
        task_id: String,
        /// Human-readable failure message.
        message: String,
    },

    /// Merge-queue validation rejected a kill request before any mutation.
    #[error("merge-queue validation failed: {code}: {message}")]
    Validation {
        /// Machine-readable code, e.g. `BRANCH_PROTECTED`.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },

    /// A bounded operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Wraps an underlying I/O failure.
    #[error("io error: {0}")]
    Io(String),

    /// Wraps a JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all for conditions with no dedicated variant.
    #[error("{0}")]
    Other(String),
}

/// Classification of worker I/O failures (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerIoKind {
    /// Transient network failure; callers may retry.
    Network,
    /// The call exceeded its deadline.
    Timeout,
    /// The request itself was malformed; retrying will not help.
    InvalidInput,
    /// The worker reported an application-level error.
    AgentError,
    /// Could not be classified into any of the above.
    Unknown,
}

impl std::fmt::Display for WorkerIoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid-input",
            Self::AgentError => "agent-error",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl WorkerIoKind {
    /// Whether a failure of this kind is safe to retry locally.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_io_kind_retryable() {
        assert!(WorkerIoKind::Network.is_retryable());
        assert!(WorkerIoKind::Timeout.is_retryable());
        assert!(!WorkerIoKind::InvalidInput.is_retryable());
        assert!(!WorkerIoKind::AgentError.is_retryable());
        assert!(!WorkerIoKind::Unknown.is_retryable());
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::NotFound("port 8001".into());
        assert_eq!(err.to_string(), "not found: port 8001");
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn gate_failed_display() {
        let err = Error::GateFailed {
            gate: "EmpiricalHonesty",
            task_id: "T-1".into(),
            message: "claim contradicts results".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("EmpiricalHonesty"));
        assert!(msg.contains("T-1"));
    }
}
