//! In-memory registry double and filesystem helpers for integration tests.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use skillhub_core::error::{Result, SyncError};
use skillhub_core::fingerprint::sha256_hex;
use skillhub_core::registry::{
    ManifestFile, PublishReceipt, PublishRequest, Registry, RemoteFile, RemoteVersionRef,
    SearchHit, UploadSlot, UploadTarget, VersionSelector, with_retry,
};

/// One published version held by the mock registry.
#[derive(Debug, Clone)]
pub struct StoredVersion {
    pub version: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Default)]
pub struct RemoteState {
    /// slug -> published versions, in publish order
    pub skills: HashMap<String, Vec<StoredVersion>>,

    /// slug -> tag -> version
    pub tags: HashMap<String, BTreeMap<String, String>>,

    /// sha256 -> raw bytes, shared across all skills
    pub blobs: HashMap<String, Vec<u8>>,

    /// Extra entries appended to every downloaded archive, outside any
    /// version manifest.
    pub archive_extras: Vec<(String, Vec<u8>)>,

    /// When set, the next commit fails with `Conflict` carrying this reason.
    pub fail_next_commit: Option<String>,

    /// Remaining resolve calls to fail with a retryable network error.
    pub transient_resolve_failures: u32,
}

/// Call counters, one per registry operation the tests care about.
#[derive(Debug, Default)]
pub struct Calls {
    pub resolve: AtomicU32,
    pub slots: AtomicU32,
    pub uploads: AtomicU32,
    pub commits: AtomicU32,
    pub downloads: AtomicU32,
}

/// In-memory [`Registry`] with per-operation call counting.
#[derive(Debug, Default)]
pub struct MockRegistry {
    pub state: Mutex<RemoteState>,
    pub calls: Calls,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a published version directly, bypassing the publish pipeline.
    pub fn seed(&self, slug: &str, version: &str, files: &[(&str, &[u8])]) {
        let mut state = self.state.lock().expect("mock state poisoned");
        let manifest: Vec<ManifestFile> = files
            .iter()
            .map(|(path, bytes)| {
                let sha = sha256_hex(bytes);
                state.blobs.insert(sha.clone(), bytes.to_vec());
                ManifestFile {
                    path: path.to_string(),
                    sha256: sha.clone(),
                    storage_id: format!("st_{sha}"),
                }
            })
            .collect();
        state
            .skills
            .entry(slug.to_string())
            .or_default()
            .push(StoredVersion {
                version: version.to_string(),
                files: manifest,
            });
        state
            .tags
            .entry(slug.to_string())
            .or_default()
            .insert("latest".to_string(), version.to_string());
    }

    /// Overwrite the stored bytes for a hash, leaving the manifest intact.
    /// Used to simulate storage corruption.
    pub fn corrupt_blob(&self, sha256: &str, bytes: &[u8]) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.blobs.insert(sha256.to_string(), bytes.to_vec());
    }

    /// Smuggle an unmanifested entry into every archive this registry serves.
    pub fn inject_archive_entry(&self, path: &str, bytes: &[u8]) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.archive_extras.push((path.to_string(), bytes.to_vec()));
    }

    pub fn fail_next_commit(&self, reason: &str) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.fail_next_commit = Some(reason.to_string());
    }

    pub fn fail_resolves(&self, count: u32) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.transient_resolve_failures = count;
    }

    pub fn latest_version(&self, slug: &str) -> Option<String> {
        let state = self.state.lock().expect("mock state poisoned");
        let tag = state.tags.get(slug)?.get("latest")?.clone();
        Some(tag)
    }

    fn version_ref(state: &RemoteState, slug: &str, version: &StoredVersion) -> RemoteVersionRef {
        RemoteVersionRef {
            skill_id: format!("skill_{slug}"),
            version: version.version.clone(),
            files: version
                .files
                .iter()
                .map(|f| RemoteFile {
                    path: f.path.clone(),
                    size: state.blobs.get(&f.sha256).map(|b| b.len() as u64).unwrap_or(0),
                    sha256: f.sha256.clone(),
                    storage_id: f.storage_id.clone(),
                })
                .collect(),
            tags: state.tags.get(slug).cloned().unwrap_or_default(),
        }
    }

    fn next_transient_failure(&self) -> Result<()> {
        let mut state = self.state.lock().expect("mock state poisoned");
        if state.transient_resolve_failures > 0 {
            state.transient_resolve_failures -= 1;
            return Err(SyncError::network("connection reset", true));
        }
        Ok(())
    }

    fn lookup(&self, slug: &str, selector: &VersionSelector) -> Result<Option<RemoteVersionRef>> {
        let state = self.state.lock().expect("mock state poisoned");
        let Some(versions) = state.skills.get(slug) else {
            return Ok(None);
        };
        let wanted = match selector {
            VersionSelector::Exact(version) => Some(version.clone()),
            VersionSelector::Latest => state
                .tags
                .get(slug)
                .and_then(|tags| tags.get("latest"))
                .cloned(),
            VersionSelector::Tag(tag) => {
                state.tags.get(slug).and_then(|tags| tags.get(tag)).cloned()
            }
        };
        let Some(wanted) = wanted else {
            return Ok(None);
        };
        Ok(versions
            .iter()
            .find(|v| v.version == wanted)
            .map(|v| Self::version_ref(&state, slug, v)))
    }
}

impl Registry for MockRegistry {
    // Reads retry transient failures inside the implementation, matching the
    // HTTP client; callers get at most `MAX_READ_ATTEMPTS` attempts total.
    async fn resolve_latest(&self, slug: &str) -> Result<Option<RemoteVersionRef>> {
        with_retry("resolve_latest", || async move {
            self.calls.resolve.fetch_add(1, Ordering::SeqCst);
            self.next_transient_failure()?;
            self.lookup(slug, &VersionSelector::Latest)
        })
        .await
    }

    async fn resolve(&self, slug: &str, selector: &VersionSelector) -> Result<RemoteVersionRef> {
        with_retry("resolve", || async move {
            self.calls.resolve.fetch_add(1, Ordering::SeqCst);
            self.next_transient_failure()?;
            self.lookup(slug, selector)?
                .ok_or_else(|| SyncError::NotFound(format!("{slug} @ {selector:?}")))
        })
        .await
    }

    async fn request_upload_slot(
        &self,
        slug: &str,
        path: &str,
        sha256: &str,
    ) -> Result<UploadSlot> {
        self.calls.slots.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().expect("mock state poisoned");
        if state.blobs.contains_key(sha256) {
            Ok(UploadSlot::AlreadyExists {
                storage_id: format!("st_{sha256}"),
            })
        } else {
            Ok(UploadSlot::Fresh {
                upload_url: format!("mock://upload/{slug}/{path}"),
            })
        }
    }

    async fn upload(&self, _target: &UploadTarget, bytes: Vec<u8>) -> Result<String> {
        self.calls.uploads.fetch_add(1, Ordering::SeqCst);
        let sha = sha256_hex(&bytes);
        let mut state = self.state.lock().expect("mock state poisoned");
        state.blobs.insert(sha.clone(), bytes);
        Ok(format!("st_{sha}"))
    }

    async fn commit_publish(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().expect("mock state poisoned");
        if let Some(reason) = state.fail_next_commit.take() {
            return Err(SyncError::Conflict(reason));
        }
        for file in &request.files {
            if !state.blobs.contains_key(&file.sha256) {
                return Err(SyncError::Validation(format!(
                    "no blob for {} ({})",
                    file.path, file.sha256
                )));
            }
        }
        state
            .skills
            .entry(request.slug.clone())
            .or_default()
            .push(StoredVersion {
                version: request.version.clone(),
                files: request.files.clone(),
            });
        let tags = state.tags.entry(request.slug.clone()).or_default();
        for tag in &request.tags {
            tags.insert(tag.clone(), request.version.clone());
        }
        Ok(PublishReceipt {
            skill_id: format!("skill_{}", request.slug),
            version_id: format!("ver_{}_{}", request.slug, request.version),
        })
    }

    async fn download_archive(&self, slug: &str, version: &str) -> Result<Vec<u8>> {
        self.calls.downloads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().expect("mock state poisoned");
        let stored = state
            .skills
            .get(slug)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .ok_or_else(|| SyncError::NotFound(format!("{slug}@{version}")))?;

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for file in &stored.files {
                let bytes = state
                    .blobs
                    .get(&file.sha256)
                    .ok_or_else(|| SyncError::NotFound(format!("blob {}", file.sha256)))?;
                writer
                    .start_file(file.path.as_str(), options)
                    .map_err(|e| SyncError::network(format!("zip: {e}"), false))?;
                writer
                    .write_all(bytes)
                    .map_err(|e| SyncError::network(format!("zip: {e}"), false))?;
            }
            for (path, bytes) in &state.archive_extras {
                writer
                    .start_file(path.as_str(), options)
                    .map_err(|e| SyncError::network(format!("zip: {e}"), false))?;
                writer
                    .write_all(bytes)
                    .map_err(|e| SyncError::network(format!("zip: {e}"), false))?;
            }
            writer
                .finish()
                .map_err(|e| SyncError::network(format!("zip: {e}"), false))?;
        }
        Ok(buf.into_inner())
    }

    async fn whoami(&self) -> Result<String> {
        Ok("mock-user".to_string())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let state = self.state.lock().expect("mock state poisoned");
        let mut hits: Vec<SearchHit> = state
            .skills
            .keys()
            .filter(|slug| slug.contains(query))
            .map(|slug| SearchHit {
                slug: slug.clone(),
                display_name: None,
                summary: None,
            })
            .collect();
        hits.sort_by(|a, b| a.slug.cmp(&b.slug));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Write a skill folder under `root` and return its path.
pub fn write_skill(root: &Path, slug: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(slug);
    for (path, content) in files {
        let full = dir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("create skill dirs");
        }
        std::fs::write(&full, content).expect("write skill file");
    }
    dir
}
