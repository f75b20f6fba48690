//! Publish pipeline: hash, acquire upload slots, upload, commit.
//!
//! Per-file slot acquisition and upload run concurrently under a small cap.
//! Content already known to the registry is never re-uploaded; the slot
//! response carries the existing storage reference instead. The manifest is
//! committed only when every file has a storage reference, and the lockfile
//! is written only after the commit succeeds.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Result, SyncError};
use crate::fingerprint::{FileFingerprint, LocalSkillSnapshot};
use crate::lockfile::{LockEntry, LockfileService};
use crate::registry::{ManifestFile, PublishReceipt, PublishRequest, Registry, UploadSlot, UploadTarget};

/// Caller-supplied publish metadata.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Display name; defaults to the slug.
    pub display_name: Option<String>,

    /// Changelog text for the new version.
    pub changelog: String,

    /// Tags to point at the new version.
    pub tags: Vec<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            display_name: None,
            changelog: String::new(),
            tags: vec!["latest".to_string()],
        }
    }
}

/// Result of a completed publish.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub slug: String,
    pub version: String,
    pub receipt: PublishReceipt,
    /// Files whose bytes were actually uploaded.
    pub uploaded: usize,
    /// Files reused via content-addressed dedup.
    pub deduped: usize,
}

/// Drives one skill's publish end to end.
pub struct PublishPipeline<R> {
    registry: Arc<R>,
    lockfile: LockfileService,
    concurrency: usize,
}

impl<R: Registry + 'static> PublishPipeline<R> {
    pub fn new(registry: Arc<R>, lockfile: LockfileService, concurrency: usize) -> Self {
        Self {
            registry,
            lockfile,
            concurrency: concurrency.max(1),
        }
    }

    /// Publish a fingerprinted folder as `version`.
    ///
    /// Any per-file failure fails the whole publish before the commit;
    /// already-uploaded blobs stay on the registry and are reused through
    /// dedup on the next attempt. A `Conflict` from the commit is surfaced
    /// without touching the lockfile.
    pub async fn publish(
        &self,
        snapshot: &LocalSkillSnapshot,
        version: &str,
        options: &PublishOptions,
    ) -> Result<PublishOutcome> {
        let slug = snapshot.slug.clone();
        tracing::info!(slug, version, files = snapshot.files.len(), "publishing");

        let manifest = self.resolve_storage(&slug, snapshot).await?;
        let uploaded = manifest.iter().filter(|(_, fresh)| *fresh).count();
        let deduped = manifest.len() - uploaded;

        let request = PublishRequest {
            slug: slug.clone(),
            display_name: options
                .display_name
                .clone()
                .unwrap_or_else(|| slug.clone()),
            version: version.to_string(),
            changelog: options.changelog.clone(),
            tags: options.tags.clone(),
            files: manifest.into_iter().map(|(file, _)| file).collect(),
        };

        let receipt = self.registry.commit_publish(&request).await?;

        let entry = LockEntry::new(slug.clone(), version, snapshot.hash_map());
        self.lockfile.upsert(entry).await?;

        tracing::info!(slug, version, uploaded, deduped, "published");
        Ok(PublishOutcome {
            slug,
            version: version.to_string(),
            receipt,
            uploaded,
            deduped,
        })
    }

    /// Acquire a storage reference for every file, uploading only content the
    /// registry doesn't already hold. Returns manifest entries in snapshot
    /// order, each flagged true when bytes were uploaded.
    async fn resolve_storage(
        &self,
        slug: &str,
        snapshot: &LocalSkillSnapshot,
    ) -> Result<Vec<(ManifestFile, bool)>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<(usize, ManifestFile, bool)>> = JoinSet::new();

        for (index, file) in snapshot.files.iter().enumerate() {
            let registry = Arc::clone(&self.registry);
            let semaphore = Arc::clone(&semaphore);
            let slug = slug.to_string();
            let file = file.clone();
            let abs_path = snapshot.folder_path.join(&file.relative_path);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SyncError::network("upload pool closed", false))?;
                let (file, fresh) = resolve_one(registry.as_ref(), &slug, &file, &abs_path).await?;
                Ok((index, file, fresh))
            });
        }

        let mut manifest: Vec<Option<(ManifestFile, bool)>> = vec![None; snapshot.files.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, file, fresh) = joined
                .map_err(|e| SyncError::network(format!("upload task failed: {e}"), false))??;
            manifest[index] = Some((file, fresh));
        }

        // Every slot is filled once all tasks joined successfully.
        Ok(manifest.into_iter().flatten().collect())
    }
}

/// Resolve one file's storage reference: dedup hit or slot + raw upload.
async fn resolve_one<R: Registry>(
    registry: &R,
    slug: &str,
    file: &FileFingerprint,
    abs_path: &std::path::Path,
) -> Result<(ManifestFile, bool)> {
    let slot = registry
        .request_upload_slot(slug, &file.relative_path, &file.content_hash)
        .await?;

    let (storage_id, fresh) = match slot {
        UploadSlot::AlreadyExists { storage_id } => {
            tracing::debug!(slug, path = file.relative_path, "dedup hit, skipping upload");
            (storage_id, false)
        }
        UploadSlot::Fresh { upload_url } => {
            let bytes = std::fs::read(abs_path).map_err(|e| SyncError::io(abs_path, e))?;
            let target = UploadTarget { upload_url };
            let storage_id = registry.upload(&target, bytes).await?;
            (storage_id, true)
        }
    };

    Ok((
        ManifestFile {
            path: file.relative_path.clone(),
            sha256: file.content_hash.clone(),
            storage_id,
        },
        fresh,
    ))
}
