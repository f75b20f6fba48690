//! Lockfile persistence with atomic replace-on-write.
//!
//! One lockfile per workdir at `.skillhub/lock.json`. Saves go through a
//! temp file followed by a rename so a crash mid-write can never leave a
//! half-written lockfile behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::lockfile::types::{LockEntry, Lockfile};

/// Lockfile storage and persistence.
pub struct LockfileStore;

impl LockfileStore {
    /// Load the lockfile from disk.
    ///
    /// A missing file is not an error: it yields an empty lockfile.
    /// An unreadable or corrupt file is fatal for the run.
    pub fn load(path: &Path) -> Result<Lockfile> {
        if !path.exists() {
            return Ok(Lockfile::new());
        }

        let bytes = std::fs::read(path)
            .map_err(|e| SyncError::Lockfile(format!("cannot read {}: {e}", path.display())))?;
        let lockfile: Lockfile = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Lockfile(format!("cannot parse {}: {e}", path.display())))?;
        lockfile
            .validate()
            .map_err(|e| SyncError::Lockfile(e.to_string()))?;
        Ok(lockfile)
    }

    /// Save the lockfile atomically (tmp + rename).
    pub fn save(path: &Path, lockfile: &Lockfile) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| SyncError::Lockfile(format!("no parent dir: {}", path.display())))?;
        std::fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;

        // Serialize first so a failure can't touch the existing file.
        let bytes = serde_json::to_vec_pretty(lockfile)
            .map_err(|e| SyncError::Lockfile(format!("cannot serialize lockfile: {e}")))?;

        let tmp_path = dir.join(format!("lock.json.tmp.{}", std::process::id()));
        std::fs::write(&tmp_path, bytes).map_err(|e| SyncError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, path).map_err(|e| SyncError::io(&tmp_path, e))?;

        Ok(())
    }
}

/// Lockfile operations behind a single-owner critical section.
///
/// One sync pass runs many skills, possibly in parallel; every write goes
/// through the load-modify-save cycle under this mutex so upserts are never
/// interleaved across skills. Single-process use only.
#[derive(Debug, Clone)]
pub struct LockfileService {
    path: PathBuf,
    guard: Arc<tokio::sync::Mutex<()>>,
}

impl LockfileService {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Lockfile path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current lockfile (read-only access).
    pub fn load(&self) -> Result<Lockfile> {
        LockfileStore::load(&self.path)
    }

    /// Get a lock entry by slug.
    pub fn get(&self, slug: &str) -> Result<Option<LockEntry>> {
        Ok(self.load()?.get(slug).cloned())
    }

    /// Atomically add or replace a lock entry.
    pub async fn upsert(&self, entry: LockEntry) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut lockfile = self.load()?;
        lockfile.upsert(entry);
        LockfileStore::save(&self.path, &lockfile)
    }

    /// Atomically remove a lock entry.
    ///
    /// Returns `true` if the entry existed and was removed.
    pub async fn remove(&self, slug: &str) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut lockfile = self.load()?;
        let removed = lockfile.remove(slug).is_some();
        if removed {
            LockfileStore::save(&self.path, &lockfile)?;
        }
        Ok(removed)
    }
}
