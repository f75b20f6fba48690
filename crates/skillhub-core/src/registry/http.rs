//! HTTP implementation of the registry client.
//!
//! Owns the reqwest client, bearer-token attachment, status-to-error
//! mapping, and the retry policy for idempotent reads.

use serde::Deserialize;
use url::Url;

use crate::error::{Result, SyncError};
use crate::registry::client::{Registry, with_retry};
use crate::registry::schema::{
    PublishReceipt, PublishRequest, RemoteVersionRef, SearchHit, UploadSlot, UploadTarget,
    VersionSelector,
};

/// Registry client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base: Url,
    token: Option<String>,
    client: reqwest::Client,
}

/// `GET /api/skill` and `GET /api/skill/resolve` response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillEnvelope {
    #[serde(default)]
    skill: Option<SkillWire>,
    #[serde(default)]
    latest_version: Option<RemoteVersionRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    tags: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadReceipt {
    storage_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhoamiResponse {
    user: WhoamiUser,
}

#[derive(Debug, Deserialize)]
struct WhoamiUser {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl HttpRegistry {
    /// Create a client for a registry base URL with an optional token.
    pub fn new(base: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| SyncError::Validation(format!("invalid registry URL '{base}': {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("skillhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::network(format!("cannot build HTTP client: {e}"), false))?;
        Ok(Self {
            base,
            token,
            client,
        })
    }

    /// Endpoint URL for a registry API path.
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| SyncError::Validation(format!("invalid endpoint '{path}': {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map transport failures to retryable network errors.
    fn transport_error(e: reqwest::Error) -> SyncError {
        SyncError::network(format!("request failed: {e}"), true)
    }

    /// Map non-success statuses to the error taxonomy.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        };

        Err(match status.as_u16() {
            401 | 403 => SyncError::Auth(detail),
            404 => SyncError::NotFound(detail),
            409 => SyncError::Conflict(detail),
            400..=499 => SyncError::Validation(detail),
            _ => SyncError::network(detail, true),
        })
    }

    async fn fetch_skill(&self, url: Url) -> Result<SkillEnvelope> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::network(format!("malformed skill response: {e}"), false))
    }

    /// Fold the skill's tag map into the version payload.
    fn merge_envelope(envelope: SkillEnvelope) -> Option<RemoteVersionRef> {
        let mut version = envelope.latest_version?;
        if let Some(skill) = envelope.skill {
            if version.skill_id.is_empty() {
                version.skill_id = skill.id.unwrap_or_default();
            }
            if version.tags.is_empty() {
                version.tags = skill.tags;
            }
        }
        Some(version)
    }
}

impl Registry for HttpRegistry {
    async fn resolve_latest(&self, slug: &str) -> Result<Option<RemoteVersionRef>> {
        let mut url = self.endpoint("/api/skill")?;
        url.query_pairs_mut().append_pair("slug", slug);

        let envelope = with_retry("resolve_latest", || self.fetch_skill(url.clone())).await;
        match envelope {
            Ok(envelope) => Ok(Self::merge_envelope(envelope)),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn resolve(&self, slug: &str, selector: &VersionSelector) -> Result<RemoteVersionRef> {
        let mut url = self.endpoint("/api/skill/resolve")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("slug", slug);
            match selector {
                VersionSelector::Latest => {
                    query.append_pair("tag", "latest");
                }
                VersionSelector::Tag(tag) => {
                    query.append_pair("tag", tag);
                }
                VersionSelector::Exact(version) => {
                    query.append_pair("version", version);
                }
            }
        }

        let envelope = with_retry("resolve", || self.fetch_skill(url.clone())).await?;
        Self::merge_envelope(envelope)
            .ok_or_else(|| SyncError::NotFound(format!("no such version for '{slug}'")))
    }

    async fn request_upload_slot(&self, slug: &str, path: &str, sha256: &str) -> Result<UploadSlot> {
        let url = self.endpoint("/api/cli/upload-url")?;
        let body = serde_json::json!({ "slug": slug, "path": path, "sha256": sha256 });

        let response = self
            .authorize(self.client.post(url).json(&body))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::network(format!("malformed upload-slot response: {e}"), false))
    }

    async fn upload(&self, target: &UploadTarget, bytes: Vec<u8>) -> Result<String> {
        let response = self
            .client
            .post(&target.upload_url)
            .body(bytes)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response).await?;
        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| SyncError::network(format!("malformed upload response: {e}"), false))?;
        Ok(receipt.storage_id)
    }

    async fn commit_publish(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        let url = self.endpoint("/api/cli/publish")?;

        // Write operation: no retry. A 409 here is a version conflict,
        // surfaced as-is for the caller to report.
        let response = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::network(format!("malformed publish response: {e}"), false))
    }

    async fn download_archive(&self, slug: &str, version: &str) -> Result<Vec<u8>> {
        let mut url = self.endpoint("/api/download")?;
        url.query_pairs_mut()
            .append_pair("slug", slug)
            .append_pair("version", version);

        with_retry("download", || async {
            let response = self
                .authorize(self.client.get(url.clone()))
                .send()
                .await
                .map_err(Self::transport_error)?;
            let response = Self::check(response).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| SyncError::network(format!("truncated download: {e}"), true))?;
            Ok(bytes.to_vec())
        })
        .await
    }

    async fn whoami(&self) -> Result<String> {
        let url = self.endpoint("/api/cli/whoami")?;

        with_retry("whoami", || async {
            let response = self
                .authorize(self.client.get(url.clone()))
                .send()
                .await
                .map_err(Self::transport_error)?;
            let response = Self::check(response).await?;
            let whoami: WhoamiResponse = response
                .json()
                .await
                .map_err(|e| SyncError::network(format!("malformed whoami response: {e}"), false))?;
            Ok(whoami.user.handle)
        })
        .await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut url = self.endpoint("/api/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string());

        with_retry("search", || async {
            let response = self
                .authorize(self.client.get(url.clone()))
                .send()
                .await
                .map_err(Self::transport_error)?;
            let response = Self::check(response).await?;
            let results: SearchResponse = response
                .json()
                .await
                .map_err(|e| SyncError::network(format!("malformed search response: {e}"), false))?;
            Ok(results.results)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_paths_against_base() {
        let registry =
            HttpRegistry::new("https://registry.example", None).expect("new should succeed");
        let url = registry.endpoint("/api/cli/publish").expect("join should succeed");
        assert_eq!(url.as_str(), "https://registry.example/api/cli/publish");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpRegistry::new("not a url", None);
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[test]
    fn envelope_merges_skill_tags_into_version() {
        let envelope: SkillEnvelope = serde_json::from_str(
            r#"{
                "skill": {"id": "skill_1", "tags": {"latest": "1.2.0"}},
                "latestVersion": {
                    "version": "1.2.0",
                    "files": [{"path": "SKILL.md", "sha256": "aaa", "storageId": "st_1"}]
                }
            }"#,
        )
        .expect("parse should succeed");

        let version = HttpRegistry::merge_envelope(envelope).expect("version should exist");
        assert_eq!(version.skill_id, "skill_1");
        assert_eq!(version.tags.get("latest"), Some(&"1.2.0".to_string()));
        assert_eq!(version.files[0].storage_id, "st_1");
    }

    #[test]
    fn envelope_without_version_is_none() {
        let envelope: SkillEnvelope =
            serde_json::from_str(r#"{"skill": null, "latestVersion": null}"#)
                .expect("parse should succeed");
        assert!(HttpRegistry::merge_envelope(envelope).is_none());
    }
}
