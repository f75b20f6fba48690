//! Wire types for the registry API.
//!
//! These mirror the registry's JSON payloads and are read-only to the core;
//! the registry is authoritative for everything in them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A file as recorded by the registry for a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Path relative to the skill root
    pub path: String,

    /// File size in bytes
    #[serde(default)]
    pub size: u64,

    /// SHA-256 of the file contents, lowercase hex
    pub sha256: String,

    /// Content-addressed storage reference
    pub storage_id: String,
}

/// The registry's record of a skill version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVersionRef {
    /// Registry identifier for the skill
    #[serde(default)]
    pub skill_id: String,

    /// Version string (semver)
    pub version: String,

    /// File manifest for this version
    pub files: Vec<RemoteFile>,

    /// Tag name → version mapping for the skill
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RemoteVersionRef {
    /// Path → sha256 map for integrity checks and reconciliation.
    pub fn hash_map(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.sha256.clone()))
            .collect()
    }
}

/// Which version of a skill to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// The version the `latest` tag points at
    Latest,
    /// The version a named tag points at
    Tag(String),
    /// An explicit version string (bypasses tag resolution)
    Exact(String),
}

/// Upload destination for one file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    /// Opaque URL the raw bytes are POSTed to
    pub upload_url: String,
}

/// Response to an upload-slot request.
///
/// `AlreadyExists` is the content-addressed dedup signal: the registry
/// already holds this exact content hash for this skill, so the bytes must
/// not be uploaded again.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum UploadSlot {
    AlreadyExists {
        #[serde(rename = "storageId")]
        storage_id: String,
    },
    Fresh {
        #[serde(rename = "uploadUrl")]
        upload_url: String,
    },
}

/// One manifest line of a publish commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub path: String,
    pub sha256: String,
    pub storage_id: String,
}

/// Full publish commit payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub slug: String,
    pub display_name: String,
    pub version: String,
    pub changelog: String,
    pub tags: Vec<String>,
    pub files: Vec<ManifestFile>,
}

/// Identifiers returned by a successful publish commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub skill_id: String,
    pub version_id: String,
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub slug: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}
