//! Sync orchestration: scan, classify, and act on every skill in a run.
//!
//! Skills are processed independently. A failure on one skill is recorded
//! and the run moves on; only auth and lockfile errors abort the whole
//! invocation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SyncContext;
use crate::error::{Result, SyncError};
use crate::fingerprint::{LocalSkillSnapshot, fingerprint_folder};
use crate::install::{InstallOutcome, InstallPipeline};
use crate::lockfile::LockfileService;
use crate::publish::{PublishOptions, PublishPipeline};
use crate::reconcile::{Decision, decide};
use crate::registry::{Registry, VersionSelector};

/// How decisions are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Classify and report only; no writes, local or remote.
    DryRun,

    /// Apply every actionable decision without asking.
    Batch,

    /// Ask the caller's callback before each actionable decision.
    Interactive,
}

/// Per-skill knobs applied to publishes made during a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub changelog: Option<String>,
    pub tags: Option<Vec<String>>,
    pub explicit_version: Option<String>,
}

/// What happened to one skill during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTaken {
    /// Nothing to do (skip, unchanged, or a dry-run plan).
    None,

    /// Would have acted; dry-run stopped short of doing it.
    Planned,

    /// The interactive callback declined the action.
    Declined,

    /// A new version was published.
    Published { version: String },

    /// Remote content was installed or reinstalled locally.
    Installed { version: String },

    /// The action was attempted and failed; the run continued.
    Failed { error: String },
}

/// One skill's classification and outcome.
#[derive(Debug, Clone)]
pub struct SkillReport {
    pub slug: String,
    pub decision: Decision,
    pub action: ActionTaken,
}

/// Aggregate result of a sync run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub reports: Vec<SkillReport>,
}

impl SyncSummary {
    pub fn published(&self) -> usize {
        self.count(|a| matches!(a, ActionTaken::Published { .. }))
    }

    pub fn installed(&self) -> usize {
        self.count(|a| matches!(a, ActionTaken::Installed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|a| matches!(a, ActionTaken::Failed { .. }))
    }

    pub fn conflicts(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.decision, Decision::Conflict { .. }))
            .count()
    }

    /// False when any skill failed or was left in conflict.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.conflicts() == 0
    }

    fn count(&self, pred: impl Fn(&ActionTaken) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.action)).count()
    }
}

/// Walks every skill once per run and applies its decision.
pub struct SyncOrchestrator<R> {
    registry: Arc<R>,
    lockfile: LockfileService,
    ctx: SyncContext,
}

impl<R: Registry + 'static> SyncOrchestrator<R> {
    pub fn new(registry: Arc<R>, lockfile: LockfileService, ctx: SyncContext) -> Self {
        Self {
            registry,
            lockfile,
            ctx,
        }
    }

    /// Run one sync pass over `roots`.
    ///
    /// `approve` is consulted per actionable skill in interactive mode; it
    /// receives the slug and the decision and returns whether to proceed.
    pub async fn sync(
        &self,
        roots: &[PathBuf],
        mode: SyncMode,
        options: &SyncOptions,
        mut approve: impl FnMut(&str, &Decision) -> bool,
    ) -> Result<SyncSummary> {
        let folders = discover_skill_folders(roots)?;
        let lockfile = self.lockfile.load()?;

        // Union of what's on disk and what the lockfile tracks, so removed
        // folders still get an InstallMissing classification.
        let mut slugs: BTreeMap<String, Option<PathBuf>> = BTreeMap::new();
        let mut snapshots: BTreeMap<String, LocalSkillSnapshot> = BTreeMap::new();
        let mut summary = SyncSummary::default();

        for folder in folders {
            match fingerprint_folder(&folder) {
                Ok(snapshot) => {
                    slugs.insert(snapshot.slug.clone(), Some(folder));
                    snapshots.insert(snapshot.slug.clone(), snapshot);
                }
                Err(SyncError::Validation(message)) => {
                    tracing::debug!(folder = %folder.display(), message, "skipping folder");
                }
                Err(err) if err.is_fatal_for_run() => return Err(err),
                Err(err) => summary.reports.push(SkillReport {
                    slug: folder
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    decision: Decision::Skip,
                    action: ActionTaken::Failed {
                        error: err.to_string(),
                    },
                }),
            }
        }
        for slug in lockfile.skills.keys() {
            slugs.entry(slug.clone()).or_insert(None);
        }

        for (slug, folder) in &slugs {
            let report = self
                .sync_one(slug, folder.as_deref(), snapshots.get(slug), mode, options, &mut approve)
                .await;
            match report {
                Ok(report) => summary.reports.push(report),
                Err(err) if err.is_fatal_for_run() => return Err(err),
                Err(err) => summary.reports.push(SkillReport {
                    slug: slug.clone(),
                    decision: Decision::Skip,
                    action: ActionTaken::Failed {
                        error: err.to_string(),
                    },
                }),
            }
        }

        tracing::info!(
            skills = summary.reports.len(),
            published = summary.published(),
            installed = summary.installed(),
            conflicts = summary.conflicts(),
            failed = summary.failed(),
            "sync finished"
        );
        Ok(summary)
    }

    async fn sync_one(
        &self,
        slug: &str,
        folder: Option<&Path>,
        snapshot: Option<&LocalSkillSnapshot>,
        mode: SyncMode,
        options: &SyncOptions,
        approve: &mut impl FnMut(&str, &Decision) -> bool,
    ) -> Result<SkillReport> {
        let lock = self.lockfile.get(slug)?;

        // Fast path: local files identical to the lock entry needs no
        // network traffic at all.
        let clean = match (snapshot, &lock) {
            (Some(snapshot), Some(lock)) => lock.matches_files(&snapshot.hash_map()),
            _ => false,
        };
        // Transient read failures are retried inside the registry
        // implementation, never here.
        let remote = if clean {
            None
        } else {
            self.registry.resolve_latest(slug).await?
        };

        let decision = decide(
            snapshot,
            lock.as_ref(),
            remote.as_ref(),
            self.ctx.bump,
            options.explicit_version.as_deref(),
        )?;
        tracing::debug!(slug, ?decision, "classified");

        let actionable = matches!(
            decision,
            Decision::PublishNew { .. }
                | Decision::PublishUpdate { .. }
                | Decision::UpdateAvailable { .. }
                | Decision::InstallMissing
        );

        let action = if !actionable {
            ActionTaken::None
        } else {
            match mode {
                SyncMode::DryRun => ActionTaken::Planned,
                SyncMode::Interactive if !approve(slug, &decision) => ActionTaken::Declined,
                SyncMode::Batch | SyncMode::Interactive => {
                    match self.execute(slug, folder, snapshot, &decision, options).await {
                        Ok(action) => action,
                        Err(err) if err.is_fatal_for_run() => return Err(err),
                        Err(err) => {
                            tracing::warn!(slug, error = %err, "skill failed");
                            ActionTaken::Failed {
                                error: err.to_string(),
                            }
                        }
                    }
                }
            }
        };

        Ok(SkillReport {
            slug: slug.to_string(),
            decision,
            action,
        })
    }

    async fn execute(
        &self,
        slug: &str,
        folder: Option<&Path>,
        snapshot: Option<&LocalSkillSnapshot>,
        decision: &Decision,
        options: &SyncOptions,
    ) -> Result<ActionTaken> {
        match decision {
            Decision::PublishNew { version } | Decision::PublishUpdate { to: version, .. } => {
                let snapshot = snapshot.ok_or_else(|| {
                    SyncError::Validation(format!("no local files for '{slug}'"))
                })?;
                let pipeline = PublishPipeline::new(
                    Arc::clone(&self.registry),
                    self.lockfile.clone(),
                    self.ctx.upload_concurrency,
                );
                let mut publish_options = PublishOptions {
                    changelog: options.changelog.clone().unwrap_or_default(),
                    ..PublishOptions::default()
                };
                if let Some(tags) = &options.tags {
                    publish_options.tags = tags.clone();
                }
                let outcome = pipeline.publish(snapshot, version, &publish_options).await?;
                Ok(ActionTaken::Published {
                    version: outcome.version,
                })
            }
            Decision::UpdateAvailable { .. } | Decision::InstallMissing => {
                let dest = match folder {
                    Some(folder) => folder.to_path_buf(),
                    None => self.ctx.skills_dir.join(slug),
                };
                let pipeline =
                    InstallPipeline::new(Arc::clone(&self.registry), self.lockfile.clone());
                match pipeline
                    .install(slug, &VersionSelector::Latest, &dest, false)
                    .await?
                {
                    InstallOutcome::Installed { version, .. } => {
                        Ok(ActionTaken::Installed { version })
                    }
                    InstallOutcome::UpToDate { .. } => Ok(ActionTaken::None),
                }
            }
            Decision::Skip | Decision::Unchanged | Decision::Conflict { .. } => {
                Ok(ActionTaken::None)
            }
        }
    }
}

/// List candidate skill folders directly under each root.
///
/// Dot-directories are skipped; unreadable roots fail the run.
pub fn discover_skill_folders(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for root in roots {
        if !root.exists() {
            continue;
        }
        let entries = std::fs::read_dir(root).map_err(|e| SyncError::io(root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::io(root, e))?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if path.is_dir() && !hidden {
                folders.push(path);
            }
        }
    }
    folders.sort();
    Ok(folders)
}
