//! Install pipeline behavior: verification, local edit protection, updates.

mod support;

use std::sync::Arc;

use tempfile::TempDir;

use skillhub_core::fingerprint::sha256_hex;
use skillhub_core::prelude::*;
use support::{MockRegistry, write_skill};

fn harness(temp: &TempDir) -> (Arc<MockRegistry>, LockfileService) {
    let registry = Arc::new(MockRegistry::new());
    let lockfile = LockfileService::new(temp.path().join(".skillhub").join("lock.json"));
    (registry, lockfile)
}

#[tokio::test]
async fn install_writes_files_and_records_the_lock_entry() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed(
        "my-skill",
        "1.2.0",
        &[("SKILL.md", b"# Skill"), ("notes/usage.md", b"how to")],
    );

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    let outcome = pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::Installed {
            version: "1.2.0".to_string(),
            files: 2
        }
    );
    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# Skill");

    let entry = lockfile.get("my-skill").unwrap().expect("lock entry");
    assert_eq!(entry.version, "1.2.0");
    assert_eq!(entry.tag.as_deref(), Some("latest"));
}

#[tokio::test]
async fn corrupted_download_fails_integrity_and_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "1.0.0", &[("SKILL.md", b"# Skill")]);
    registry.corrupt_blob(&sha256_hex(b"# Skill"), b"tampered");

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    let err = pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .expect_err("install should fail");

    assert!(matches!(err, SyncError::Integrity { .. }));
    assert!(!dest.exists());
    assert!(lockfile.get("my-skill").unwrap().is_none());
}

#[tokio::test]
async fn unmanifested_archive_entries_fail_integrity() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "1.0.0", &[("SKILL.md", b"# Skill")]);
    registry.inject_archive_entry("INJECTED.md", b"smuggled");

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    let err = pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .expect_err("install should fail");

    assert!(matches!(err, SyncError::Integrity { .. }));
    assert!(!dest.exists());
    assert!(lockfile.get("my-skill").unwrap().is_none());
}

#[tokio::test]
async fn local_edits_block_install_unless_forced() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "2.0.0", &[("SKILL.md", b"# v2")]);

    // The folder holds content unknown to both the lockfile and 2.0.0.
    let dest = write_skill(&temp.path().join("skills"), "my-skill", &[("SKILL.md", "# edited")]);

    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    let err = pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .expect_err("install should fail");
    assert!(matches!(err, SyncError::LocalMismatch { .. }));
    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# edited");

    // Forced install overwrites.
    pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, true)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# v2");
}

#[tokio::test]
async fn update_is_a_noop_when_already_at_latest() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "1.0.0", &[("SKILL.md", b"# Skill")]);

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();

    let outcome = pipeline
        .update("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        InstallOutcome::UpToDate {
            version: "1.0.0".to_string()
        }
    );
}

#[tokio::test]
async fn update_applies_a_newer_remote_version() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "1.0.0", &[("SKILL.md", b"# v1")]);

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();

    registry.seed("my-skill", "1.1.0", &[("SKILL.md", b"# v1.1")]);
    let outcome = pipeline
        .update("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# v1.1");
    assert_eq!(
        lockfile.get("my-skill").unwrap().expect("lock entry").version,
        "1.1.0"
    );
}

#[tokio::test]
async fn update_refuses_a_downgrade_unless_the_version_is_explicit() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "2.0.0", &[("SKILL.md", b"# v2")]);

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    pipeline
        .install("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();

    // The registry rolls `latest` back to an older version.
    registry.seed("my-skill", "1.0.0", &[("SKILL.md", b"# v1")]);

    let outcome = pipeline
        .update("my-skill", &VersionSelector::Latest, &dest, false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        InstallOutcome::UpToDate {
            version: "2.0.0".to_string()
        }
    );
    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# v2");

    // An explicit version goes through even though it is older.
    let outcome = pipeline
        .update(
            "my-skill",
            &VersionSelector::Exact("1.0.0".to_string()),
            &dest,
            false,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# v1");

    let entry = lockfile.get("my-skill").unwrap().expect("lock entry");
    assert_eq!(entry.version, "1.0.0");
    assert_eq!(entry.tag, None);
}

#[tokio::test]
async fn exact_version_bypasses_the_latest_tag() {
    let temp = TempDir::new().unwrap();
    let (registry, lockfile) = harness(&temp);
    registry.seed("my-skill", "1.0.0", &[("SKILL.md", b"# v1")]);
    registry.seed("my-skill", "2.0.0", &[("SKILL.md", b"# v2")]);

    let dest = temp.path().join("skills").join("my-skill");
    let pipeline = InstallPipeline::new(Arc::clone(&registry), lockfile.clone());
    pipeline
        .install(
            "my-skill",
            &VersionSelector::Exact("1.0.0".to_string()),
            &dest,
            false,
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "# v1");
    let entry = lockfile.get("my-skill").unwrap().expect("lock entry");
    assert_eq!(entry.version, "1.0.0");
    assert_eq!(entry.tag, None);
}
