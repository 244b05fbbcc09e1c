// Sidecar metadata store - one `<stem>.json` per artifact in the backup directory

use super::path_guard::{artifact_stem, is_compressed_name, PathGuard};
use super::types::{BackupArtifact, BackupError, BackupMetadata};
use crate::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Reads and writes sidecars in the backup directory.
pub struct MetadataStore {
    backup_directory: PathBuf,
}

impl MetadataStore {
    /// Store rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            backup_directory: directory.into(),
        }
    }

    /// Directory the sidecars live in.
    pub fn directory(&self) -> &Path {
        &self.backup_directory
    }

    /// `<stem>.json` next to the artifact.
    pub fn sidecar_path(&self, artifact_name: &str) -> PathBuf {
        self.backup_directory
            .join(format!("{}.json", artifact_stem(artifact_name)))
    }

    /// Write the sidecar via temp file + rename so readers never see partial JSON.
    pub async fn write(&self, metadata: &BackupMetadata) -> Result<PathBuf> {
        let final_path = self.sidecar_path(&metadata.filename);
        let temp_path = final_path.with_extension("json.tmp");

        let metadata_json = serde_json::to_string_pretty(metadata)
            .map_err(|e| BackupError::Metadata(format!("Failed to serialize metadata: {}", e)))?;

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| BackupError::io("creating metadata file", e))?;
        file.write_all(metadata_json.as_bytes())
            .await
            .map_err(|e| BackupError::io("writing metadata", e))?;
        file.sync_all()
            .await
            .map_err(|e| BackupError::io("syncing metadata", e))?;
        drop(file);

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| BackupError::io("publishing metadata", e))?;

        debug!(sidecar = %final_path.display(), "Metadata written");
        Ok(final_path)
    }

    /// Parse the sidecar of `artifact_name`; it must name that artifact.
    pub async fn read(&self, artifact_name: &str) -> Result<BackupMetadata> {
        let path = self.sidecar_path(artifact_name);
        let metadata_json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackupError::NotFound(artifact_name.to_string()))
            }
            Err(e) => return Err(BackupError::io("reading metadata", e)),
        };

        let metadata: BackupMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| BackupError::Metadata(format!("Failed to deserialize metadata: {}", e)))?;

        if metadata.filename != artifact_name {
            return Err(BackupError::Metadata(format!(
                "sidecar for {} describes {}",
                artifact_name, metadata.filename
            )));
        }
        Ok(metadata)
    }

    /// Whether a sidecar is present; I/O errors count as absent.
    pub async fn exists(&self, artifact_name: &str) -> bool {
        fs::try_exists(self.sidecar_path(artifact_name))
            .await
            .unwrap_or(false)
    }

    /// Remove the sidecar; a missing one is not an error.
    pub async fn delete(&self, artifact_name: &str) -> Result<()> {
        match fs::remove_file(self.sidecar_path(artifact_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::io("deleting metadata", e)),
        }
    }

    /// Every valid artifact (file + readable sidecar), newest first.
    pub async fn list_artifacts(&self, guard: &PathGuard) -> Result<Vec<BackupArtifact>> {
        let mut entries = match fs::read_dir(&self.backup_directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io("reading backup directory", e)),
        };

        let absolute_dir = fs::canonicalize(&self.backup_directory)
            .await
            .map_err(|e| BackupError::io("resolving backup directory", e))?;

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::io("reading directory entry", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !guard.is_artifact_name(&name) {
                continue;
            }

            let metadata = match self.read(&name).await {
                Ok(metadata) => metadata,
                Err(BackupError::NotFound(_)) => {
                    debug!(filename = %name, "Skipping artifact without sidecar");
                    continue;
                }
                Err(e) => {
                    warn!(filename = %name, error = %e, "Skipping artifact with unreadable sidecar");
                    continue;
                }
            };

            artifacts.push(BackupArtifact {
                absolute_path: absolute_dir.join(&name),
                compressed: is_compressed_name(&name),
                filename: name,
                size_bytes: metadata.size_bytes,
                checksum: metadata.checksum,
                created_at: metadata.created_at,
            });
        }

        artifacts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(artifacts)
    }
}
