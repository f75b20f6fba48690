//! Install and update pipeline: resolve, download, verify, materialize.
//!
//! The downloaded archive is extracted into a temp staging directory next to
//! the target, verified file-by-file against the version manifest, and only
//! then moved into place. A failed verification discards the staging
//! directory and leaves the target untouched.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;

use crate::error::{Result, SyncError};
use crate::fingerprint::{fingerprint_folder, sha256_hex};
use crate::lockfile::{LockEntry, LockfileService};
use crate::registry::{Registry, RemoteVersionRef, VersionSelector};

/// Result of one install or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Files were written and the lockfile updated.
    Installed { version: String, files: usize },

    /// The locked version already satisfies the request; nothing written.
    UpToDate { version: String },
}

/// Drives one skill's install or update end to end.
pub struct InstallPipeline<R> {
    registry: Arc<R>,
    lockfile: LockfileService,
}

impl<R: Registry> InstallPipeline<R> {
    pub fn new(registry: Arc<R>, lockfile: LockfileService) -> Self {
        Self { registry, lockfile }
    }

    /// Install a skill into `dest_dir`.
    ///
    /// When `dest_dir` already holds files that match neither the resolved
    /// version nor the currently locked version, the install fails with
    /// `LocalMismatch` unless `force` is set.
    pub async fn install(
        &self,
        slug: &str,
        selector: &VersionSelector,
        dest_dir: &Path,
        force: bool,
    ) -> Result<InstallOutcome> {
        let remote = self.registry.resolve(slug, selector).await?;
        tracing::info!(slug, version = remote.version, "installing");

        self.guard_local_edits(slug, dest_dir, &remote, force)?;

        let archive = self.registry.download_archive(slug, &remote.version).await?;

        let files = materialize(&archive, &remote, dest_dir)?;

        let mut entry = LockEntry::new(slug, remote.version.clone(), remote.hash_map());
        match selector {
            VersionSelector::Latest => entry = entry.with_tag("latest"),
            VersionSelector::Tag(tag) => entry = entry.with_tag(tag.clone()),
            VersionSelector::Exact(_) => {}
        }
        self.lockfile.upsert(entry).await?;

        tracing::info!(slug, version = remote.version, files, "installed");
        Ok(InstallOutcome::Installed {
            version: remote.version,
            files,
        })
    }

    /// Update an already-installed skill.
    ///
    /// Without an explicit version, only a strictly newer remote version is
    /// applied; an up-to-date skill is a no-op, not an error. An explicit
    /// version bypasses the newer-only constraint.
    pub async fn update(
        &self,
        slug: &str,
        selector: &VersionSelector,
        dest_dir: &Path,
        force: bool,
    ) -> Result<InstallOutcome> {
        let locked = self
            .lockfile
            .get(slug)?
            .ok_or_else(|| SyncError::NotFound(format!("'{slug}' is not installed")))?;

        if !matches!(selector, VersionSelector::Exact(_)) && !force {
            let remote = self.registry.resolve(slug, selector).await?;
            let locked_version = parse_version(&locked.version)?;
            let remote_version = parse_version(&remote.version)?;
            if remote_version <= locked_version {
                tracing::debug!(slug, version = locked.version, "already up to date");
                return Ok(InstallOutcome::UpToDate {
                    version: locked.version,
                });
            }
        }

        self.install(slug, selector, dest_dir, force).await
    }

    /// Refuse to clobber local edits unless forced.
    ///
    /// An existing target is acceptable when it matches the resolved version
    /// (reinstall) or the currently locked version (ordinary upgrade).
    fn guard_local_edits(
        &self,
        slug: &str,
        dest_dir: &Path,
        remote: &RemoteVersionRef,
        force: bool,
    ) -> Result<()> {
        if force || !dest_dir.exists() {
            return Ok(());
        }

        let existing = match fingerprint_folder(dest_dir) {
            Ok(snapshot) => snapshot.hash_map(),
            // An empty folder has nothing to protect.
            Err(SyncError::Validation(_)) => return Ok(()),
            Err(err) => return Err(err),
        };

        if existing == remote.hash_map() {
            return Ok(());
        }
        if let Some(locked) = self.lockfile.get(slug)? {
            if locked.matches_files(&existing) {
                return Ok(());
            }
        }

        Err(SyncError::LocalMismatch {
            dir: dest_dir.to_path_buf(),
        })
    }
}

/// Extract, verify, and atomically move a downloaded archive into place.
fn materialize(archive: &[u8], remote: &RemoteVersionRef, dest_dir: &Path) -> Result<usize> {
    let parent = dest_dir
        .parent()
        .ok_or_else(|| SyncError::Validation(format!("no parent dir: {}", dest_dir.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;

    // Staging lives next to the target so the final rename never crosses a
    // filesystem boundary; drop on any error removes it.
    let staging = tempfile::Builder::new()
        .prefix(".skillhub-stage-")
        .tempdir_in(parent)
        .map_err(|e| SyncError::io(parent, e))?;

    extract_archive(archive, remote, staging.path())?;
    verify_manifest(staging.path(), remote)?;

    swap_into_place(staging, dest_dir)?;
    Ok(remote.files.len())
}

/// Extract a zip archive, skipping entries with unsafe paths.
///
/// File entries the version manifest does not list fail integrity; nothing
/// the manifest cannot vouch for may reach the target.
fn extract_archive(data: &[u8], remote: &RemoteVersionRef, dest: &Path) -> Result<()> {
    let manifest: BTreeSet<&str> = remote.files.iter().map(|f| f.path.as_str()).collect();
    let cursor = std::io::Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| SyncError::network(format!("corrupt archive: {e}"), false))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| SyncError::network(format!("corrupt archive entry {i}: {e}"), false))?;

        // Path traversal guard.
        let relative = match file.enclosed_name() {
            Some(path) => path,
            None => continue,
        };
        let outpath = dest.join(&relative);

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| SyncError::io(&outpath, e))?;
        } else {
            let name = relative.to_string_lossy();
            if !manifest.contains(name.as_ref()) {
                return Err(SyncError::Integrity {
                    path: name.into_owned(),
                    expected: "absent".to_string(),
                    actual: "present".to_string(),
                });
            }
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
            }
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .map_err(|e| SyncError::network(format!("truncated archive: {e}"), false))?;
            std::fs::write(&outpath, buffer).map_err(|e| SyncError::io(&outpath, e))?;
        }
    }

    Ok(())
}

/// Check every manifest file exists in the staging dir with the exact
/// recorded hash. Missing or mismatched content fails integrity; nothing is
/// written to the target.
fn verify_manifest(staging: &Path, remote: &RemoteVersionRef) -> Result<()> {
    for file in &remote.files {
        let path = staging.join(&file.path);
        let bytes = std::fs::read(&path).map_err(|_| SyncError::Integrity {
            path: file.path.clone(),
            expected: file.sha256.clone(),
            actual: "missing".to_string(),
        })?;
        let actual = sha256_hex(&bytes);
        if actual != file.sha256 {
            return Err(SyncError::Integrity {
                path: file.path.clone(),
                expected: file.sha256.clone(),
                actual,
            });
        }
    }
    Ok(())
}

/// Replace `dest_dir` with the verified staging directory.
///
/// An existing target is parked under a temp name first so a failure moving
/// the staging dir in can restore it.
fn swap_into_place(staging: tempfile::TempDir, dest_dir: &Path) -> Result<()> {
    let backup: Option<PathBuf> = if dest_dir.exists() {
        let parked = dest_dir.with_extension(format!("old.{}", std::process::id()));
        std::fs::rename(dest_dir, &parked).map_err(|e| SyncError::io(dest_dir, e))?;
        Some(parked)
    } else {
        None
    };

    let staging_path = staging.keep();
    if let Err(e) = std::fs::rename(&staging_path, dest_dir) {
        let _ = std::fs::remove_dir_all(&staging_path);
        if let Some(parked) = &backup {
            let _ = std::fs::rename(parked, dest_dir);
        }
        return Err(SyncError::io(dest_dir, e));
    }

    if let Some(parked) = backup {
        std::fs::remove_dir_all(&parked).map_err(|e| SyncError::io(&parked, e))?;
    }
    Ok(())
}

fn parse_version(version: &str) -> Result<Version> {
    Version::parse(version)
        .map_err(|e| SyncError::Validation(format!("invalid version '{version}': {e}")))
}
