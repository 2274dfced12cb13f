//! File-Lock Registry (spec.md §4.5): path-scoped exclusive/shared locks
//! with TTL expiry and glob-pattern overlap detection.
//!
//! Mirrors `zjj-core`'s registry shape: a single map guarded by a lock,
//! a short critical section per operation, and an explicit expiry sweep
//! rather than background eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{Error, Result};

/// A granted lock on a path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileLock {
    /// The locked path or glob pattern.
    pub path: String,
    /// Identity of the holder.
    pub holder: String,
    /// Whether this lock excludes all other locks on overlapping paths.
    pub exclusive: bool,
    /// When the lock was granted.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl FileLock {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A lock acquisition request.
#[derive(Debug, Clone)]
pub struct LockRequest {
    /// Path or glob pattern to lock.
    pub path: String,
    /// Identity requesting the lock.
    pub holder: String,
    /// Whether the request is exclusive.
    pub exclusive: bool,
    /// Lease duration.
    pub ttl: Duration,
}

/// Registry of active file locks, keyed by path/pattern. Multiple shared
/// locks may coexist on the same path, so each key holds a vector rather
/// than a single record.
#[derive(Clone)]
pub struct FileLockRegistry {
    locks: Arc<RwLock<HashMap<String, Vec<FileLock>>>>,
}

impl Default for FileLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FileLockRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attempt to acquire a lock for `req`. Refuses on any conflicting
    /// active lock, exact-path or glob-overlapping in either direction.
    pub async fn acquire(&self, req: LockRequest) -> Result<FileLock> {
        let now = Utc::now();
        let mut locks = self.locks.write().await;

        for entry in locks.values_mut() {
            entry.retain(|lock| !lock.is_expired(now));
        }

        for existing in locks.values().flatten() {
            if !paths_overlap(&req.path, &existing.path) {
                continue;
            }
            if existing.exclusive || req.exclusive {
                return Err(Error::LockConflict {
                    path: req.path.clone(),
                    holder: existing.holder.clone(),
                    exclusive_note: if existing.exclusive {
                        " (exclusive)"
                    } else {
                        ""
                    },
                });
            }
        }

        let lock = FileLock {
            path: req.path.clone(),
            holder: req.holder,
            exclusive: req.exclusive,
            acquired_at: now,
            expires_at: now
                + chrono::Duration::from_std(req.ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        };
        locks.entry(req.path).or_default().push(lock.clone());
        Ok(lock)
    }

    /// Release the active lock at `path` owned by `holder`.
    pub async fn release(&self, path: &str, holder: &str) -> Result<()> {
        let now = Utc::now();
        let mut locks = self.locks.write().await;
        let Some(entry) = locks.get_mut(path) else {
            return Err(Error::LockNotHeld(path.to_string()));
        };
        let held = entry
            .iter()
            .position(|lock| lock.holder == holder && !lock.is_expired(now));
        let Some(index) = held else {
            return Err(Error::LockNotHeld(path.to_string()));
        };
        entry.remove(index);
        if entry.is_empty() {
            locks.remove(path);
        }
        Ok(())
    }

    /// Return the active (non-expired) locks on `path`.
    pub async fn check(&self, path: &str) -> Vec<FileLock> {
        let now = Utc::now();
        let locks = self.locks.read().await;
        locks
            .get(path)
            .into_iter()
            .flatten()
            .filter(|lock| !lock.is_expired(now))
            .cloned()
            .collect()
    }

    /// Extend the expiry of the active lock at `path` owned by `holder`.
    pub async fn renew(&self, path: &str, holder: &str, new_ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let mut locks = self.locks.write().await;
        let new_expiry = now
            + chrono::Duration::from_std(new_ttl).unwrap_or_else(|_| chrono::Duration::zero());
        match locks
            .get_mut(path)
            .and_then(|entry| entry.iter_mut().find(|lock| lock.holder == holder && !lock.is_expired(now)))
        {
            Some(lock) => {
                lock.expires_at = new_expiry;
                Ok(())
            }
            None => Err(Error::NotFound(format!("no active lock at '{path}'"))),
        }
    }

    /// Remove every expired lock, returning the count removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut locks = self.locks.write().await;
        let before: usize = locks.values().map(Vec::len).sum();
        for entry in locks.values_mut() {
            entry.retain(|lock| !lock.is_expired(now));
        }
        locks.retain(|_, entry| !entry.is_empty());
        let after: usize = locks.values().map(Vec::len).sum();
        before - after
    }
}

/// True if `a` and `b` could both match the same file, via exact match
/// or glob overlap in either direction.
fn paths_overlap(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    glob_matches(a, b) || glob_matches(b, a)
}

/// True if literal path `candidate` matches glob `pattern`. Non-glob
/// patterns fall back to exact equality.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(candidate),
        Err(_) => pattern == candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(path: &str, holder: &str, exclusive: bool) -> LockRequest {
        LockRequest {
            path: path.to_string(),
            holder: holder.to_string(),
            exclusive,
            ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn exclusive_locks_conflict_on_exact_path() {
        let registry = FileLockRegistry::new();
        registry.acquire(req("src/main.rs", "agent-a", true)).await.unwrap();
        let err = registry
            .acquire(req("src/main.rs", "agent-b", true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockConflict { .. }));
    }

    #[tokio::test]
    async fn shared_locks_on_the_same_path_may_coexist() {
        let registry = FileLockRegistry::new();
        registry.acquire(req("src/main.rs", "agent-a", false)).await.unwrap();
        registry.acquire(req("src/main.rs", "agent-b", false)).await.unwrap();
        let held = registry.check("src/main.rs").await;
        assert_eq!(held.len(), 2);
        assert!(held.iter().any(|lock| lock.holder == "agent-a"));
        assert!(held.iter().any(|lock| lock.holder == "agent-b"));

        registry.release("src/main.rs", "agent-a").await.unwrap();
        let remaining = registry.check("src/main.rs").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].holder, "agent-b");
    }

    #[tokio::test]
    async fn glob_overlap_is_detected_in_both_directions() {
        let registry = FileLockRegistry::new();
        registry
            .acquire(req("src/*.rs", "agent-a", true))
            .await
            .unwrap();
        let err = registry
            .acquire(req("src/main.rs", "agent-b", true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockConflict { .. }));
    }

    #[tokio::test]
    async fn release_requires_ownership() {
        let registry = FileLockRegistry::new();
        registry.acquire(req("src/main.rs", "agent-a", true)).await.unwrap();
        let err = registry.release("src/main.rs", "agent-b").await.unwrap_err();
        assert!(matches!(err, Error::LockNotHeld(_)));
        registry.release("src/main.rs", "agent-a").await.unwrap();
    }

    #[tokio::test]
    async fn renew_extends_expiry_of_held_lock() {
        let registry = FileLockRegistry::new();
        registry
            .acquire(LockRequest {
                path: "src/main.rs".into(),
                holder: "agent-a".into(),
                exclusive: true,
                ttl: Duration::from_millis(10),
            })
            .await
            .unwrap();
        registry
            .renew("src/main.rs", "agent-a", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.check("src/main.rs").await.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_expired_sweeps_stale_locks() {
        let registry = FileLockRegistry::new();
        registry
            .acquire(LockRequest {
                path: "src/main.rs".into(),
                holder: "agent-a".into(),
                exclusive: true,
                ttl: Duration::from_millis(5),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.cleanup_expired().await, 1);
        assert!(registry.check("src/main.rs").await.is_empty());
    }

    #[tokio::test]
    async fn an_expired_lock_does_not_block_a_new_acquisition() {
        let registry = FileLockRegistry::new();
        registry
            .acquire(LockRequest {
                path: "src/main.rs".into(),
                holder: "agent-a".into(),
                exclusive: true,
                ttl: Duration::from_millis(5),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.acquire(req("src/main.rs", "agent-b", true)).await.unwrap();
    }
}
