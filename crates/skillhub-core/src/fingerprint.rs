//! Content fingerprinting for skill folders.
//!
//! Walks a skill folder, hashes every eligible file, and produces a
//! [`LocalSkillSnapshot`]. The result is a pure function of folder contents:
//! entries are sorted lexicographically by relative path so the snapshot is
//! identical regardless of filesystem iteration order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};

/// Directory names never included in a snapshot.
const IGNORED_DIRS: &[&str] = &["node_modules", "__pycache__", "target"];

/// A fingerprinted file within a skill folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    /// Path relative to the skill folder, `/`-separated.
    pub relative_path: String,

    /// File size in bytes.
    pub size_bytes: u64,

    /// SHA-256 of the file contents, lowercase hex.
    pub content_hash: String,
}

/// Ephemeral snapshot of a skill folder's contents.
///
/// Recomputed on every scan; never persisted.
#[derive(Debug, Clone)]
pub struct LocalSkillSnapshot {
    /// Slug derived from the folder name or SKILL.md frontmatter.
    pub slug: String,

    /// Files sorted lexicographically by relative path.
    pub files: Vec<FileFingerprint>,

    /// Absolute path of the scanned folder.
    pub folder_path: PathBuf,
}

impl LocalSkillSnapshot {
    /// Relative-path → content-hash map, for comparison against a lock entry.
    pub fn hash_map(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|f| (f.relative_path.clone(), f.content_hash.clone()))
            .collect()
    }
}

/// SHA-256 of a byte slice, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint a skill folder.
///
/// Skips dotfiles, dot-directories, and well-known build directories.
/// Fails with [`SyncError::Validation`] when the folder holds zero eligible
/// files, and with [`SyncError::Io`] when it cannot be read.
pub fn fingerprint_folder(folder: &Path) -> Result<LocalSkillSnapshot> {
    let mut files = Vec::new();
    collect_files(folder, folder, &mut files)?;

    if files.is_empty() {
        return Err(SyncError::Validation(format!(
            "no eligible files in {}",
            folder.display()
        )));
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let slug = derive_slug(folder, &files)?;

    Ok(LocalSkillSnapshot {
        slug,
        files,
        folder_path: folder.to_path_buf(),
    })
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<FileFingerprint>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))?;

    let mut sorted: Vec<_> = entries
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| SyncError::io(dir, e))?;
    sorted.sort_by_key(|e| e.file_name());

    for entry in sorted {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let ty = entry.file_type().map_err(|e| SyncError::io(&path, e))?;

        if ty.is_dir() {
            if IGNORED_DIRS.contains(&name_str.as_ref()) {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if ty.is_file() {
            let bytes = std::fs::read(&path).map_err(|e| SyncError::io(&path, e))?;
            let relative = path
                .strip_prefix(root)
                .map_err(|_| SyncError::Validation(format!("path escapes root: {}", path.display())))?;
            out.push(FileFingerprint {
                relative_path: to_slash_path(relative),
                size_bytes: bytes.len() as u64,
                content_hash: sha256_hex(&bytes),
            });
        }
        // Symlinks and special files are skipped.
    }

    Ok(())
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive the slug candidate: SKILL.md frontmatter `name:` wins over the
/// folder name. The result must be a valid slug.
fn derive_slug(folder: &Path, files: &[FileFingerprint]) -> Result<String> {
    if files.iter().any(|f| f.relative_path == "SKILL.md") {
        let content = std::fs::read_to_string(folder.join("SKILL.md"))
            .map_err(|e| SyncError::io(folder.join("SKILL.md"), e))?;
        if let Some(name) = frontmatter_name(&content) {
            return validate_slug(&name);
        }
    }

    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| SyncError::Validation(format!("no folder name: {}", folder.display())))?;
    validate_slug(&name)
}

/// Extract `name:` from a leading `---` frontmatter block, if present.
fn frontmatter_name(content: &str) -> Option<String> {
    let mut lines = content.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" {
            return None;
        }
        if let Some(value) = trimmed.strip_prefix("name:") {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn validate_slug(name: &str) -> Result<String> {
    let slug = name.to_lowercase();
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if !valid {
        return Err(SyncError::Validation(format!("invalid slug: '{name}'")));
    }
    Ok(slug)
}
