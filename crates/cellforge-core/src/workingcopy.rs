//! Working-Copy Manager (spec.md §4.2): create/remove isolated filesystem
//! checkouts on a branch, with idempotent cleanup.
//!
//! The underlying VCS tool is an external collaborator (spec.md §1); this
//! module models it through the `VcsWorkingCopyOps` seam so the manager
//! itself stays testable without a real checkout tool on `PATH`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::WorkingCopyId;
use crate::{Error, Result};

/// A created working copy: its ID, the branch it tracks, and its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    /// The working copy's ID.
    pub id: WorkingCopyId,
    /// The branch this copy was created on.
    pub branch: String,
    /// Filesystem path of the checkout. Layout beneath `base` is opaque
    /// to callers.
    pub path: std::path::PathBuf,
}

/// Seam over the underlying VCS working-copy tool (spec.md §1's "seen
/// only through create/remove/commit/revert primitives").
#[async_trait::async_trait]
pub trait VcsWorkingCopyOps: Send + Sync {
    /// Create a checkout of `branch` at `path`.
    async fn create(&self, path: &std::path::Path, branch: &str) -> Result<()>;
    /// Remove the checkout at `path`. Must succeed if `path` is already absent.
    async fn remove(&self, path: &std::path::Path) -> Result<()>;
    /// Commit the working copy's current state with `message`.
    async fn commit(&self, path: &std::path::Path, message: &str) -> Result<()>;
    /// Revert the working copy to its last committed state.
    async fn revert(&self, path: &std::path::Path) -> Result<()>;
}

/// Filesystem-backed default implementation: "create" makes an empty
/// directory tree (standing in for a real checkout), "remove" deletes it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemVcsOps;

#[async_trait::async_trait]
impl VcsWorkingCopyOps for FilesystemVcsOps {
    async fn create(&self, path: &std::path::Path, _branch: &str) -> Result<()> {
        tokio::fs::create_dir_all(path).await.map_err(Error::from)
    }

    async fn remove(&self, path: &std::path::Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn commit(&self, _path: &std::path::Path, _message: &str) -> Result<()> {
        Ok(())
    }

    async fn revert(&self, _path: &std::path::Path) -> Result<()> {
        Ok(())
    }
}

/// Manages working-copy checkouts beneath a fixed base directory.
#[derive(Clone)]
pub struct WorkingCopyManager {
    base: std::path::PathBuf,
    vcs: Arc<dyn VcsWorkingCopyOps>,
    copies: Arc<Mutex<HashMap<WorkingCopyId, WorkingCopy>>>,
}

impl WorkingCopyManager {
    /// Construct a manager rooted at `base`, using the given VCS seam.
    #[must_use]
    pub fn new(base: std::path::PathBuf, vcs: Arc<dyn VcsWorkingCopyOps>) -> Self {
        Self {
            base,
            vcs,
            copies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Construct a manager using the filesystem-backed default VCS seam.
    #[must_use]
    pub fn with_filesystem_backend(base: std::path::PathBuf) -> Self {
        Self::new(base, Arc::new(FilesystemVcsOps))
    }

    fn path_for(&self, id: &WorkingCopyId) -> std::path::PathBuf {
        self.base.join(id.as_str())
    }

    /// Create a new working copy on `branch`. Refuses if `id` already
    /// has a copy registered (idempotent-refusal, not idempotent-success).
    pub async fn create(&self, id: WorkingCopyId, branch: &str) -> Result<WorkingCopy> {
        let mut copies = self.copies.lock().await;
        if copies.contains_key(&id) {
            return Err(Error::ResourceExhausted(format!(
                "working copy '{id}' already exists"
            )));
        }
        let path = self.path_for(&id);
        self.vcs.create(&path, branch).await?;
        let copy = WorkingCopy {
            id: id.clone(),
            branch: branch.to_string(),
            path,
        };
        copies.insert(id, copy.clone());
        Ok(copy)
    }

    /// Remove a working copy. Succeeds (no-op) if it was already absent.
    pub async fn remove(&self, id: &WorkingCopyId) -> Result<()> {
        let path = self.path_for(id);
        self.vcs.remove(&path).await?;
        let mut copies = self.copies.lock().await;
        copies.remove(id);
        Ok(())
    }

    /// List all currently tracked working copies.
    pub async fn list(&self) -> Vec<WorkingCopy> {
        self.copies.lock().await.values().cloned().collect()
    }

    /// Commit a working copy's current state with `message`.
    pub async fn commit(&self, id: &WorkingCopyId, message: &str) -> Result<()> {
        self.vcs.commit(&self.path_for(id), message).await
    }

    /// Revert a working copy to its last committed state.
    pub async fn revert(&self, id: &WorkingCopyId) -> Result<()> {
        self.vcs.revert(&self.path_for(id)).await
    }

    /// Remove every tracked working copy.
    pub async fn cleanup_all(&self) -> Result<()> {
        let ids: Vec<WorkingCopyId> = self.copies.lock().await.keys().cloned().collect();
        for id in ids {
            self.remove(&id).await?;
        }
        Ok(())
    }

    /// Scan `base` for on-disk remnants not present in the in-memory
    /// registry (leftover from a prior process) and remove them. Must be
    /// called at process start per spec.md §4.2.
    pub async fn prune(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::from(e)),
        };

        let known: std::collections::HashSet<String> = {
            let copies = self.copies.lock().await;
            copies.keys().map(|id| id.as_str().to_string()).collect()
        };

        while let Some(entry) = entries.next_entry().await.map_err(Error::from)? {
            let name = entry.file_name().to_string_lossy().to_string();
            if known.contains(&name) {
                continue;
            }
            if entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false)
            {
                self.vcs.remove(&entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
