// Restore Orchestrator - safety backup -> decompress -> schema reset -> replay -> cleanup
//
// Nothing destructive runs until the target has been validated, verified and
// (unless explicitly disabled) snapshotted by a successful safety backup.

use super::checksum::compute_checksum;
use super::compression::decompress_file;
use super::confirm::ConfirmationProvider;
use super::metadata::MetadataStore;
use super::orchestrator::{elapsed_ms, BackupOrchestrator};
use super::path_guard::{is_compressed_name, PathGuard};
use super::restore_runner::RestoreRunner;
use super::types::{BackupError, BackupMetadata, RestoreRequest, RestoreResult};
use crate::config::BackupConfig;
use crate::process::ProcessRunner;
use crate::Result;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Verify, confirm, back up, reset and replay.
pub struct RestoreOrchestrator {
    config: Arc<BackupConfig>,
    guard: PathGuard,
    metadata: Arc<MetadataStore>,
    backups: Arc<BackupOrchestrator>,
    runner: RestoreRunner,
    confirmation: Arc<dyn ConfirmationProvider>,
}

impl RestoreOrchestrator {
    /// Safety backups go through `backups`; psql runs on `process_runner`.
    pub fn new(
        config: Arc<BackupConfig>,
        guard: PathGuard,
        metadata: Arc<MetadataStore>,
        backups: Arc<BackupOrchestrator>,
        process_runner: Arc<dyn ProcessRunner>,
        confirmation: Arc<dyn ConfirmationProvider>,
    ) -> Self {
        let runner = RestoreRunner::new(process_runner, config.psql_path.clone());
        Self {
            config,
            guard,
            metadata,
            backups,
            runner,
            confirmation,
        }
    }

    /// Restore `request.target_filename` into the configured database.
    #[instrument(skip(self), fields(target = %request.target_filename))]
    pub async fn restore(&self, request: &RestoreRequest) -> Result<RestoreResult> {
        let started = Instant::now();
        let name = request.target_filename.as_str();

        let artifact_path = self.guard.resolve(name)?;

        if !request.skip_confirmation {
            let prompt = format!(
                "Restoring {} will DROP schema \"{}\" in database \"{}\". Continue?",
                name, self.config.connection.schema, self.config.connection.database
            );
            if !self.confirmation.confirm(&prompt).await? {
                info!("Restore declined by operator");
                return Err(BackupError::ConfirmationDeclined);
            }
        }

        let metadata = self.load_target(name, &artifact_path).await?;

        let safety_backup = if request.create_safety_backup {
            info!("Creating safety backup before restore");
            let record = self
                .backups
                .create_backup()
                .await
                .map_err(|e| BackupError::SafetyBackupFailed(Box::new(e)))?;
            info!(safety_backup = %record.filename, "Safety backup created");
            Some(record.filename)
        } else {
            warn!("Restoring without a safety backup");
            None
        };

        let (sql_path, temp_path) = if metadata.compressed || is_compressed_name(name) {
            let temp = self
                .config
                .backup_dir
                .join(format!(".restore-{}.sql", Uuid::new_v4()));
            (temp.clone(), Some(temp))
        } else {
            (artifact_path.clone(), None)
        };

        let outcome = self.replay(&artifact_path, &sql_path, temp_path.is_some()).await;

        if let Some(temp) = &temp_path {
            remove_temp(temp).await;
        }

        if let Err(e) = outcome {
            error!(
                error = %e,
                safety_backup = ?safety_backup,
                "Restore failed; any safety backup is kept for manual recovery"
            );
            return Err(e);
        }

        let duration_ms = elapsed_ms(started);
        info!(duration_ms = duration_ms, "Restore completed successfully");

        Ok(RestoreResult {
            success: true,
            safety_backup_created: safety_backup.is_some(),
            safety_backup,
            duration_ms,
        })
    }

    /// Stat the artifact, require its sidecar, and optionally verify the checksum.
    async fn load_target(&self, name: &str, artifact_path: &Path) -> Result<BackupMetadata> {
        match fs::metadata(artifact_path).await {
            Ok(stat) if stat.is_file() => {}
            Ok(_) => return Err(BackupError::NotFound(name.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackupError::NotFound(name.to_string()))
            }
            Err(e) => return Err(BackupError::io("reading backup file", e)),
        }

        let metadata = self.metadata.read(name).await?;

        if self.config.verify_before_restore {
            let actual = compute_checksum(artifact_path).await?;
            if actual != metadata.checksum {
                return Err(BackupError::ChecksumMismatch {
                    expected: metadata.checksum.clone(),
                    actual,
                });
            }
        }
        Ok(metadata)
    }

    async fn replay(&self, artifact_path: &Path, sql_path: &Path, decompress: bool) -> Result<()> {
        if decompress {
            decompress_file(artifact_path, sql_path).await?;
        }
        self.runner.reset_schema(&self.config.connection).await?;
        self.runner.restore(&self.config.connection, sql_path).await
    }
}

async fn remove_temp(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary restore file"),
    }
}
