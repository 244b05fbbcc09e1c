//! Artifact filename validation
//!
//! Every entry point that accepts a filename from a caller (download, delete,
//! restore, verify) goes through [`PathGuard::resolve`] before touching the
//! filesystem. Both checks are purely lexical.

use super::types::BackupError;
use crate::Result;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// Longest accepted artifact filename
const MAX_NAME_LEN: usize = 255;

/// Validates caller-supplied artifact names against one base directory.
#[derive(Debug, Clone)]
pub struct PathGuard {
    base_dir: PathBuf,
    prefix: String,
    name_pattern: Regex,
}

impl PathGuard {
    /// Guard for artifacts named `<prefix>-*` under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, prefix: &str) -> Result<Self> {
        let pattern = format!(
            r"^{}-[A-Za-z0-9_-]+\.sql(\.gz)?$",
            regex::escape(prefix)
        );
        let name_pattern =
            Regex::new(&pattern).map_err(|e| BackupError::InvalidName(e.to_string()))?;

        Ok(Self {
            base_dir: base_dir.into(),
            prefix: prefix.to_string(),
            name_pattern,
        })
    }

    /// Directory every resolved path stays inside.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Artifact name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True if `candidate`, resolved against `base_dir`, stays inside it.
    pub fn is_safe(base_dir: &Path, candidate: &str) -> bool {
        if candidate.is_empty() || candidate.contains('\0') {
            return false;
        }

        let base = normalize(&absolute(base_dir));
        let resolved = normalize(&base.join(candidate));

        resolved != base && resolved.starts_with(&base)
    }

    /// Enforce the `<prefix>-<stamp>.sql[.gz]` convention and character set.
    pub fn validate_artifact_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(BackupError::InvalidName(name.to_string()));
        }

        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(BackupError::PathTraversal(name.to_string()));
        }

        if !self.name_pattern.is_match(name) {
            return Err(BackupError::InvalidName(name.to_string()));
        }

        Ok(())
    }

    /// Run both checks and return the artifact's path under the base directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !Self::is_safe(&self.base_dir, name) {
            return Err(BackupError::PathTraversal(name.to_string()));
        }
        self.validate_artifact_name(name)?;
        Ok(self.base_dir.join(name))
    }

    /// Name check without the error.
    pub fn is_artifact_name(&self, name: &str) -> bool {
        self.validate_artifact_name(name).is_ok()
    }
}

/// `<stem>` for `<stem>.sql` / `<stem>.sql.gz`.
pub fn artifact_stem(name: &str) -> &str {
    name.strip_suffix(".sql.gz")
        .or_else(|| name.strip_suffix(".sql"))
        .unwrap_or(name)
}

/// Gzip artifacts end in `.sql.gz`.
pub fn is_compressed_name(name: &str) -> bool {
    name.ends_with(".sql.gz")
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically fold `.` and `..` without consulting the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
