//! Registry client trait and retry policy.
//!
//! The core talks to the registry only through [`Registry`], so tests can
//! substitute a mock and the HTTP details stay in one place.

use std::future::Future;

use crate::error::Result;
use crate::registry::schema::{
    PublishReceipt, PublishRequest, RemoteVersionRef, SearchHit, UploadSlot, UploadTarget,
    VersionSelector,
};

/// Maximum attempts for retryable read operations.
pub const MAX_READ_ATTEMPTS: u32 = 3;

/// Base backoff between retry attempts.
pub const RETRY_BACKOFF_MS: u64 = 200;

/// Typed boundary to the remote registry.
///
/// All operations may fail with `Network` (retryable per policy), `Auth`
/// (fatal for the invocation), or `Validation`/`Conflict` (fatal for the
/// affected skill only). Implementations own the retry of transient read
/// failures, up to [`MAX_READ_ATTEMPTS`] via [`with_retry`]; callers must
/// not wrap these operations in a retry layer of their own. Futures are
/// `Send` so pipelines can run per-file work on the multi-threaded runtime.
pub trait Registry: Send + Sync {
    /// Resolve the latest known version of a slug, or `None` if the skill
    /// does not exist on the registry.
    fn resolve_latest(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Option<RemoteVersionRef>>> + Send;

    /// Resolve a specific version or tag. Missing skill or version is
    /// `NotFound`.
    fn resolve(
        &self,
        slug: &str,
        selector: &VersionSelector,
    ) -> impl Future<Output = Result<RemoteVersionRef>> + Send;

    /// Request an upload slot for one file's content hash.
    fn request_upload_slot(
        &self,
        slug: &str,
        path: &str,
        sha256: &str,
    ) -> impl Future<Output = Result<UploadSlot>> + Send;

    /// Upload raw bytes to a previously issued target. Returns the storage
    /// reference.
    fn upload(
        &self,
        target: &UploadTarget,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Commit a publish with a complete manifest.
    fn commit_publish(
        &self,
        request: &PublishRequest,
    ) -> impl Future<Output = Result<PublishReceipt>> + Send;

    /// Download the archive for a resolved version.
    fn download_archive(
        &self,
        slug: &str,
        version: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Validate the current token; returns the account handle.
    fn whoami(&self) -> impl Future<Output = Result<String>> + Send;

    /// Full-text search over published skills.
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SearchHit>>> + Send;
}

/// Run an idempotent read with bounded retry and backoff.
///
/// Retries only errors classified retryable; everything else is surfaced
/// immediately. Write-like operations must not go through this.
pub async fn with_retry<T, F, Fut>(op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_READ_ATTEMPTS => {
                let delay = RETRY_BACKOFF_MS * (1 << (attempt - 1));
                tracing::warn!(op, attempt, delay_ms = delay, error = %err, "retrying");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
