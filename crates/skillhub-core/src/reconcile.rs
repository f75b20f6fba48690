//! Reconciliation of local folder state, lockfile state, and remote state.
//!
//! [`decide`] is a pure function over the three sources of truth. It only
//! classifies; it never performs I/O, never auto-resolves a divergence, and
//! never mutates anything.

use semver::Version;

use crate::error::{Result, SyncError};
use crate::fingerprint::LocalSkillSnapshot;
use crate::lockfile::LockEntry;
use crate::registry::RemoteVersionRef;

/// Version written on a first publish when none is given explicitly.
pub const INITIAL_VERSION: &str = "1.0.0";

/// Version bump applied to an update publish without an explicit version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpPolicy {
    #[default]
    Patch,
    Minor,
    Major,
}

impl BumpPolicy {
    /// Compute the next version from the currently locked one.
    pub fn bump(&self, current: &Version) -> Version {
        match self {
            Self::Patch => Version::new(current.major, current.minor, current.patch + 1),
            Self::Minor => Version::new(current.major, current.minor + 1, 0),
            Self::Major => Version::new(current.major + 1, 0, 0),
        }
    }
}

impl std::str::FromStr for BumpPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            other => Err(SyncError::Validation(format!(
                "bump must be patch|minor|major, got '{other}'"
            ))),
        }
    }
}

/// What a sync pass should do for one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No local folder and no lock entry; nothing to reconcile.
    Skip,

    /// Local files match the lock entry exactly; no action, no network.
    Unchanged,

    /// Local folder exists but is unknown to both lockfile and registry.
    PublishNew { version: String },

    /// Local edits on top of the version the registry also considers latest.
    PublishUpdate { from: String, to: String },

    /// Registry has moved past the locked version; local is clean.
    UpdateAvailable { remote_version: String },

    /// Lock entry exists but the folder is gone locally.
    InstallMissing,

    /// Both sides changed independently; surfaced, never auto-resolved.
    Conflict { reason: String },
}

/// Classify one skill's state.
///
/// `remote` may be `None` either because the skill doesn't exist on the
/// registry or because the caller took the fast path and skipped the remote
/// lookup (only valid when local matches the lock entry).
pub fn decide(
    local: Option<&LocalSkillSnapshot>,
    lock: Option<&LockEntry>,
    remote: Option<&RemoteVersionRef>,
    bump: BumpPolicy,
    explicit_version: Option<&str>,
) -> Result<Decision> {
    let Some(local) = local else {
        return Ok(match lock {
            Some(_) => Decision::InstallMissing,
            None => Decision::Skip,
        });
    };

    let local_files = local.hash_map();

    let Some(lock) = lock else {
        return match remote {
            // Never seen locally, never published: a fresh publish.
            None => Ok(Decision::PublishNew {
                version: explicit_version.unwrap_or(INITIAL_VERSION).to_string(),
            }),
            // The registry already has this slug but the lockfile doesn't.
            // Identical content is benign; anything else needs a human.
            Some(remote) => {
                if remote.hash_map() == local_files {
                    Ok(Decision::Unchanged)
                } else {
                    Ok(Decision::Conflict {
                        reason: format!(
                            "'{}' exists on the registry but is not tracked locally",
                            local.slug
                        ),
                    })
                }
            }
        };
    };

    let locally_clean = lock.matches_files(&local_files);

    let Some(remote) = remote else {
        // Fast path: no remote lookup happened. Only valid when clean.
        return Ok(if locally_clean {
            Decision::Unchanged
        } else {
            // Dirty with no remote data; the caller should have fetched.
            Decision::Conflict {
                reason: "local changes with unknown remote state".to_string(),
            }
        });
    };

    let locked_version = parse_version(&lock.version)?;
    let remote_version = parse_version(&remote.version)?;

    if locally_clean {
        return Ok(match locked_version.cmp(&remote_version) {
            std::cmp::Ordering::Less => Decision::UpdateAvailable {
                remote_version: remote.version.clone(),
            },
            std::cmp::Ordering::Equal => {
                // Equal versions with different recorded content is a
                // divergence, never silently overwritten.
                if remote.hash_map() == lock.files {
                    Decision::Unchanged
                } else {
                    Decision::Conflict {
                        reason: format!(
                            "version {} has different content on the registry",
                            lock.version
                        ),
                    }
                }
            }
            std::cmp::Ordering::Greater => Decision::Conflict {
                reason: format!(
                    "lockfile records {} but the registry's latest is {}",
                    lock.version, remote.version
                ),
            },
        });
    }

    // Local edits exist. Publishing is only safe when the registry still
    // agrees with what we last installed.
    if locked_version == remote_version {
        let to = match explicit_version {
            Some(version) => version.to_string(),
            None => bump.bump(&locked_version).to_string(),
        };
        return Ok(Decision::PublishUpdate {
            from: lock.version.clone(),
            to,
        });
    }

    Ok(Decision::Conflict {
        reason: "diverged".to_string(),
    })
}

fn parse_version(version: &str) -> Result<Version> {
    Version::parse(version)
        .map_err(|e| SyncError::Validation(format!("invalid version '{version}': {e}")))
}
