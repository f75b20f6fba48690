//! Lockfile types for installed skill state.
//!
//! The lockfile is the CLI's record of what it last knew locally: one entry
//! per skill, holding the installed version and the exact per-file content
//! hashes of that version.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Lockfile mapping skill slug → installed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    /// Lockfile format version
    pub version: u32,

    /// Timestamp when lockfile was generated
    pub generated_at: chrono::DateTime<chrono::Utc>,

    /// Locked skills by slug
    #[serde(default)]
    pub skills: HashMap<String, LockEntry>,
}

impl Lockfile {
    /// Create a new empty lockfile
    pub fn new() -> Self {
        Self {
            version: 1,
            generated_at: chrono::Utc::now(),
            skills: HashMap::new(),
        }
    }

    /// Add or replace a lock entry
    pub fn upsert(&mut self, entry: LockEntry) {
        self.skills.insert(entry.slug.clone(), entry);
    }

    /// Get a lock entry by slug
    pub fn get(&self, slug: &str) -> Option<&LockEntry> {
        self.skills.get(slug)
    }

    /// Remove a lock entry
    pub fn remove(&mut self, slug: &str) -> Option<LockEntry> {
        self.skills.remove(slug)
    }

    /// Validate the lockfile
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported lockfile version: {}", self.version);
        }
        Ok(())
    }
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Installed state of one skill.
///
/// Invariant: `files` always reflects the exact content hashes of the version
/// in `version`; entries are only written by a pipeline that just completed
/// a publish or install, never mixed across versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Skill slug
    pub slug: String,

    /// Installed version (semver string)
    pub version: String,

    /// Tag the version was resolved from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Relative path → sha256 hex for every file of the installed version
    pub files: BTreeMap<String, String>,

    /// Timestamp of the last publish or install that wrote this entry
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl LockEntry {
    /// Create a lock entry for a just-completed publish or install.
    pub fn new(slug: impl Into<String>, version: impl Into<String>, files: BTreeMap<String, String>) -> Self {
        Self {
            slug: slug.into(),
            version: version.into(),
            tag: None,
            files,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Record the tag the version was resolved from.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// True when a local hash map matches this entry's files exactly.
    pub fn matches_files(&self, local: &BTreeMap<String, String>) -> bool {
        &self.files == local
    }
}
