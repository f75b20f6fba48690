//! SkillHub Core Library
//!
//! Domain logic for synchronizing a local directory of skills against a
//! remote registry: fingerprinting, reconciliation, content-addressed
//! publishing, verified installs, and the lockfile that ties them together.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod install;
pub mod lockfile;
pub mod publish;
pub mod reconcile;
pub mod registry;
pub mod sync;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{GlobalConfig, SyncContext};

    // Errors
    pub use crate::error::{Result, SyncError};

    // Fingerprinting
    pub use crate::fingerprint::{FileFingerprint, LocalSkillSnapshot, fingerprint_folder};

    // Lockfile
    pub use crate::lockfile::{LockEntry, Lockfile, LockfileService, LockfileStore};

    // Reconciliation
    pub use crate::reconcile::{BumpPolicy, Decision, decide};

    // Registry
    pub use crate::registry::{
        HttpRegistry, Registry, RemoteFile, RemoteVersionRef, SearchHit, VersionSelector,
    };

    // Pipelines
    pub use crate::install::{InstallOutcome, InstallPipeline};
    pub use crate::publish::{PublishOptions, PublishOutcome, PublishPipeline};
    pub use crate::sync::{
        ActionTaken, SkillReport, SyncMode, SyncOptions, SyncOrchestrator, SyncSummary,
    };
}
