//! Cell Process Manager (spec.md §4.3): spawn a worker bound to a port +
//! working copy, health-probe it, and terminate it.
//!
//! The worker binary itself is out of scope (spec.md §1); process
//! spawning and health probing are modeled through the `ProcessOps` seam
//! so this module is testable without a real worker binary.

use std::sync::Arc;

use crate::domain::PortNumber;
use crate::{Error, Result};

/// A handle to a booted worker process. Carries no raw process
/// reference — only the data a later activity could re-derive a client
/// from (spec.md §4.4's `BootstrapOutput` requirement, mirrored here at
/// the process-manager layer).
#[derive(Debug, Clone)]
pub struct CellHandle {
    /// OS process ID of the spawned worker.
    pub pid: u32,
    /// The port the worker is bound to.
    pub port: PortNumber,
    /// The worker's base URL.
    pub base_url: String,
}

/// Seam over process spawn + health probing, so tests can substitute a
/// fake worker without spawning a real binary.
#[async_trait::async_trait]
pub trait ProcessOps: Send + Sync {
    /// Spawn a worker process bound to `port`, rooted at `copy_path`.
    /// Returns the spawned process's PID.
    async fn spawn(&self, copy_path: &std::path::Path, copy_id: &str, port: PortNumber) -> Result<u32>;
    /// One-shot health probe against `base_url`. `Ok(true)` means healthy.
    async fn probe_health(&self, base_url: &str) -> Result<bool>;
    /// Terminate the process identified by `pid`. Idempotent: terminating
    /// an already-dead process is not an error.
    async fn terminate(&self, pid: u32) -> Result<()>;
}

/// Polling configuration for `Boot`.
#[derive(Debug, Clone, Copy)]
pub struct BootPolicy {
    /// Interval between health probes.
    pub poll_interval: std::time::Duration,
    /// Total time budget before giving up and killing the child.
    pub total_timeout: std::time::Duration,
}

impl Default for BootPolicy {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_millis(100),
            total_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// Spawns and supervises cell worker processes.
pub struct CellProcessManager {
    ops: Arc<dyn ProcessOps>,
    boot_policy: BootPolicy,
}

impl CellProcessManager {
    /// Construct a manager over the given process seam.
    #[must_use]
    pub fn new(ops: Arc<dyn ProcessOps>, boot_policy: BootPolicy) -> Self {
        Self { ops, boot_policy }
    }

    /// Spawn a worker bound to `port` and `copy_path`, polling its health
    /// endpoint at `poll_interval` until healthy or `total_timeout`
    /// elapses. On timeout the spawned child is killed and an error is
    /// returned. No retries happen inside `boot`; that is the caller's
    /// concern (spec.md §4.3).
    pub async fn boot(
        &self,
        copy_path: &std::path::Path,
        copy_id: &str,
        port: PortNumber,
    ) -> Result<CellHandle> {
        let pid = self.ops.spawn(copy_path, copy_id, port).await?;
        let base_url = format!("http://127.0.0.1:{port}");

        let deadline = tokio::time::Instant::now() + self.boot_policy.total_timeout;
        loop {
            match self.ops.probe_health(&base_url).await {
                Ok(true) => {
                    tracing::info!(pid, %port, "cell process healthy");
                    return Ok(CellHandle { pid, port, base_url });
                }
                Ok(false) | Err(_) => {
                    if tokio::time::Instant::now() >= deadline {
                        tracing::warn!(pid, %port, "cell process failed to become healthy, killing");
                        let _ = self.ops.terminate(pid).await;
                        return Err(Error::CellUnhealthy(format!(
                            "worker on port {port} did not become healthy within {:?}",
                            self.boot_policy.total_timeout
                        )));
                    }
                    tokio::time::sleep(self.boot_policy.poll_interval).await;
                }
            }
        }
    }

    /// Terminate a cell's worker process. Idempotent.
    pub async fn shutdown(&self, handle: &CellHandle) -> Result<()> {
        self.ops.terminate(handle.pid).await
    }

    /// One-shot health probe against an existing handle.
    pub async fn is_healthy(&self, handle: &CellHandle) -> Result<bool> {
        self.ops.probe_health(&handle.base_url).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{PortNumber, ProcessOps, Result};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A fake `ProcessOps` that becomes healthy after `healthy_after_n_probes`
    /// probes, and records how many times `terminate` was called.
    pub struct FakeProcessOps {
        pub healthy_after_n_probes: usize,
        probe_count: AtomicUsize,
        pub next_pid: AtomicU32,
        pub terminate_calls: Arc<AtomicUsize>,
        pub fail_spawn: bool,
    }

    impl FakeProcessOps {
        pub fn new(healthy_after_n_probes: usize) -> Self {
            Self {
                healthy_after_n_probes,
                probe_count: AtomicUsize::new(0),
                next_pid: AtomicU32::new(1000),
                terminate_calls: Arc::new(AtomicUsize::new(0)),
                fail_spawn: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl ProcessOps for FakeProcessOps {
        async fn spawn(
            &self,
            _copy_path: &std::path::Path,
            _copy_id: &str,
            _port: PortNumber,
        ) -> Result<u32> {
            if self.fail_spawn {
                return Err(crate::Error::BootstrapFailed("spawn failed".into()));
            }
            Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
        }

        async fn probe_health(&self, _base_url: &str) -> Result<bool> {
            let count = self.probe_count.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(count >= self.healthy_after_n_probes)
        }

        async fn terminate(&self, _pid: u32) -> Result<()> {
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeProcessOps;
    use super::*;
    use std::sync::atomic::Ordering;

    fn fast_policy() -> BootPolicy {
        BootPolicy {
            poll_interval: std::time::Duration::from_millis(1),
            total_timeout: std::time::Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn boot_succeeds_once_healthy() {
        let ops = Arc::new(FakeProcessOps::new(1));
        let manager = CellProcessManager::new(ops, fast_policy());
        let handle = manager
            .boot(std::path::Path::new("/tmp/wc"), "wc-1", PortNumber(9001))
            .await
            .expect("boot succeeds");
        assert_eq!(handle.port, PortNumber(9001));
    }

    #[tokio::test]
    async fn boot_times_out_and_kills_child() {
        let ops = Arc::new(FakeProcessOps::new(usize::MAX));
        let terminate_calls = ops.terminate_calls.clone();
        let manager = CellProcessManager::new(ops, fast_policy());
        let result = manager
            .boot(std::path::Path::new("/tmp/wc"), "wc-1", PortNumber(9001))
            .await;
        assert!(result.is_err());
        assert_eq!(terminate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_at_the_ops_seam() {
        let ops = Arc::new(FakeProcessOps::new(1));
        let terminate_calls = ops.terminate_calls.clone();
        let manager = CellProcessManager::new(ops, fast_policy());
        let handle = CellHandle {
            pid: 42,
            port: PortNumber(9001),
            base_url: "http://127.0.0.1:9001".into(),
        };
        manager.shutdown(&handle).await.unwrap();
        manager.shutdown(&handle).await.unwrap();
        assert_eq!(terminate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn is_healthy_reflects_probe() {
        let ops = Arc::new(FakeProcessOps::new(1));
        let manager = CellProcessManager::new(ops, fast_policy());
        let handle = CellHandle {
            pid: 42,
            port: PortNumber(9001),
            base_url: "http://127.0.0.1:9001".into(),
        };
        assert!(manager.is_healthy(&handle).await.unwrap());
    }
}
