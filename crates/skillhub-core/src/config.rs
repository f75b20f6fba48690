//! Global configuration and per-invocation context.
//!
//! The global config (registry URL, stored token) lives in the user config
//! directory as TOML. Everything the core needs at runtime is threaded
//! explicitly through [`SyncContext`]; the reconcile/publish/install logic
//! never reads ambient process state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::reconcile::BumpPolicy;

/// Default registry API base URL.
pub const DEFAULT_REGISTRY: &str = "https://skillhub.dev";

/// Default site base URL (browser-facing).
pub const DEFAULT_SITE: &str = "https://skillhub.dev";

/// Default skills directory name under the workdir.
pub const DEFAULT_SKILLS_DIR: &str = "skills";

/// Maximum concurrent per-file uploads within one publish.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Persisted global configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Registry API base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Site base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Stored API token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl GlobalConfig {
    /// Default config file path: `<config_dir>/skillhub/config.toml`.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = dirs::config_dir().context("Cannot determine config directory")?;
        Ok(base.join("skillhub").join("config.toml"))
    }

    /// Load from a path, returning defaults if the file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save to a path, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

/// Per-invocation context for all core entry points.
///
/// Frontends build this once from flags, env, and the global config, then
/// pass it to every command.
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Working directory (lockfile lives under it).
    pub workdir: PathBuf,

    /// Skills directory (default: `<workdir>/skills`).
    pub skills_dir: PathBuf,

    /// Registry API base URL.
    pub registry: String,

    /// API token, if logged in.
    pub token: Option<String>,

    /// Version bump applied to batch publishes without an explicit version.
    pub bump: BumpPolicy,

    /// Concurrency cap for per-file uploads within one publish.
    pub upload_concurrency: usize,
}

impl SyncContext {
    /// Create a context with defaults derived from the workdir and config.
    pub fn new(workdir: PathBuf, config: &GlobalConfig) -> Self {
        let skills_dir = workdir.join(DEFAULT_SKILLS_DIR);
        Self {
            workdir,
            skills_dir,
            registry: config
                .registry
                .clone()
                .unwrap_or_else(|| DEFAULT_REGISTRY.to_string()),
            token: config.token.clone(),
            bump: BumpPolicy::default(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Override the skills directory.
    pub fn with_skills_dir(mut self, dir: PathBuf) -> Self {
        self.skills_dir = dir;
        self
    }

    /// Override the registry base URL.
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Override the bump policy.
    pub fn with_bump(mut self, bump: BumpPolicy) -> Self {
        self.bump = bump;
        self
    }

    /// Lockfile path for this workdir.
    pub fn lockfile_path(&self) -> PathBuf {
        self.workdir.join(".skillhub").join("lock.json")
    }
}
