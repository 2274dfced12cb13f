//! Stale-registry recovery sweep (SPEC_FULL.md §2 supplemental).
//!
//! Working copies and file locks can outlive the process that created
//! them (a crash mid-bootstrap, an unclean shutdown). This module sweeps
//! both registries once at startup and on a fixed interval thereafter,
//! following the audit-log style of the teacher's recovery logging.

use std::time::Duration;

use crate::locks::FileLockRegistry;
use crate::workingcopy::WorkingCopyManager;
use crate::Result;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Untracked working-copy directories removed.
    pub working_copies_pruned: usize,
    /// Expired file locks removed.
    pub locks_expired: usize,
}

/// Periodically reclaims resources left behind by a prior, uncleanly
/// terminated process.
#[derive(Clone)]
pub struct RecoverySweeper {
    working_copies: WorkingCopyManager,
    locks: FileLockRegistry,
}

impl RecoverySweeper {
    /// Construct a sweeper over the given registries.
    #[must_use]
    pub fn new(working_copies: WorkingCopyManager, locks: FileLockRegistry) -> Self {
        Self {
            working_copies,
            locks,
        }
    }

    /// Run one sweep pass immediately.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let working_copies_pruned = self.working_copies.prune().await?;
        let locks_expired = self.locks.cleanup_expired().await;
        if working_copies_pruned > 0 || locks_expired > 0 {
            tracing::info!(
                working_copies_pruned,
                locks_expired,
                "recovery sweep reclaimed stale resources"
            );
        }
        Ok(SweepReport {
            working_copies_pruned,
            locks_expired,
        })
    }

    /// Run `sweep_once` now, then again every `interval` until the
    /// returned handle is dropped or aborted.
    #[must_use]
    pub fn spawn_periodic(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::warn!(error = %e, "recovery sweep failed");
                }
            }
        })
    }
}
