//! G2 — Test Immutability (spec.md §4.7).

use std::path::{Path, PathBuf};
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::domain::GateResult;
use crate::{Error, Result};

use super::Gate;

/// Locks a test file read-only and records a content hash baseline,
/// re-verifiable against later reads of the same file.
pub struct ImmutabilityGate {
    test_file: PathBuf,
    binary_file: PathBuf,
    baseline_hash: std::sync::Mutex<Option<String>>,
}

impl ImmutabilityGate {
    /// Construct the gate over a test source file and its compiled binary.
    #[must_use]
    pub fn new(test_file: PathBuf, binary_file: PathBuf) -> Self {
        Self {
            test_file,
            binary_file,
            baseline_hash: std::sync::Mutex::new(None),
        }
    }

    fn hash_file(path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Re-hash the test file and compare against the recorded baseline.
    pub fn verify_integrity(&self) -> Result<bool> {
        let current = Self::hash_file(&self.test_file)?;
        let baseline = self.baseline_hash.lock().unwrap_or_else(|e| e.into_inner());
        Ok(baseline.as_deref() == Some(current.as_str()))
    }

    /// Restore write permission on the test file for cleanup.
    pub fn unlock(&self) -> Result<()> {
        set_mode(&self.test_file, 0o644)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, permissions).map_err(Error::from)
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    let mut permissions = std::fs::metadata(path).map_err(Error::from)?.permissions();
    permissions.set_readonly(_mode & 0o200 == 0);
    std::fs::set_permissions(path, permissions).map_err(Error::from)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path).map_err(Error::from)?.permissions().mode();
    Ok(mode & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> Result<bool> {
    Ok(path.exists())
}

#[async_trait::async_trait]
impl Gate for ImmutabilityGate {
    fn name(&self) -> &'static str {
        "TestImmutability"
    }

    async fn check(&self) -> Result<GateResult> {
        let start = Instant::now();

        set_mode(&self.test_file, 0o444)?;
        let hash = Self::hash_file(&self.test_file)?;
        *self.baseline_hash.lock().unwrap_or_else(|e| e.into_inner()) = Some(hash.clone());

        if !self.binary_file.exists() {
            return Ok(GateResult::fail(
                self.name(),
                "compiled test binary does not exist",
                serde_json::json!({ "binary": self.binary_file }),
                start.elapsed(),
            ));
        }
        if !is_executable(&self.binary_file)? {
            return Ok(GateResult::fail(
                self.name(),
                "compiled test binary is not executable",
                serde_json::json!({ "binary": self.binary_file }),
                start.elapsed(),
            ));
        }

        Ok(GateResult::ok(
            self.name(),
            format!("test file locked, baseline {hash}"),
            start.elapsed(),
        ))
    }
}
