// Backup Catalog - facade consumed by the REST layer and the CLI
//
// Mutating calls are admin-only, serialized behind one lock, and emit exactly
// one audit event after the underlying operation succeeds. Reads take no lock.

use super::checksum::compute_checksum;
use super::confirm::{AutoConfirm, ConfirmationProvider};
use super::metadata::MetadataStore;
use super::orchestrator::BackupOrchestrator;
use super::path_guard::PathGuard;
use super::restore::RestoreOrchestrator;
use super::retention::RetentionPolicy;
use super::types::{
    format_size, BackupError, BackupListing, BackupMetadata, BackupRecord, CleanupResult,
    RestoreRequest, RestoreResult, VerificationResult,
};
use crate::config::BackupConfig;
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::security::{AuditAction, AuditEvent, AuditLogger, AuditSink, AuthContext};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// An opened artifact ready to be streamed to a client
#[derive(Debug)]
pub struct DownloadHandle {
    /// Name to present to the client
    pub filename: String,
    /// Checked location on disk
    pub path: PathBuf,
    /// Length for `Content-Length`
    pub size_bytes: u64,
    /// Open handle positioned at the start
    pub file: fs::File,
}

impl DownloadHandle {
    /// `Content-Disposition` header value for an attachment download.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Entry point for every backup operation.
///
/// Mutations require an admin [`AuthContext`], run one at a time and are
/// audited on success. Reads are lock-free.
pub struct BackupCatalog {
    config: Arc<BackupConfig>,
    guard: PathGuard,
    metadata: Arc<MetadataStore>,
    backups: Arc<BackupOrchestrator>,
    restorer: RestoreOrchestrator,
    retention: RetentionPolicy,
    audit: Arc<dyn AuditSink>,
    write_lock: Mutex<()>,
}

impl BackupCatalog {
    /// Validate `config` and wire the pipeline around the given collaborators.
    pub fn new(
        config: BackupConfig,
        runner: Arc<dyn ProcessRunner>,
        audit: Arc<dyn AuditSink>,
        confirmation: Arc<dyn ConfirmationProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let guard = PathGuard::new(config.backup_dir.clone(), &config.prefix)?;
        let metadata = Arc::new(MetadataStore::new(config.backup_dir.clone()));
        let backups = Arc::new(BackupOrchestrator::new(
            config.clone(),
            runner.clone(),
            metadata.clone(),
        ));
        let restorer = RestoreOrchestrator::new(
            config.clone(),
            guard.clone(),
            metadata.clone(),
            backups.clone(),
            runner,
            confirmation,
        );
        let retention = RetentionPolicy::new()
            .min_keep(config.min_keep)
            .max_age_days(config.retention_days);

        Ok(Self {
            config,
            guard,
            metadata,
            backups,
            restorer,
            retention,
            audit,
            write_lock: Mutex::new(()),
        })
    }

    /// Real subprocesses, in-memory audit trail, headless confirmation.
    pub fn with_defaults(config: BackupConfig) -> Result<Self> {
        let runner = Arc::new(TokioProcessRunner::new(config.command_timeout));
        Self::new(config, runner, Arc::new(AuditLogger::new()), Arc::new(AutoConfirm))
    }

    /// Validated configuration in use.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Take a full dump and register it as a new artifact.
    pub async fn create(&self, ctx: &AuthContext) -> Result<BackupRecord> {
        ctx.require_admin("create backup")?;
        let _write = self.write_lock.lock().await;

        let record = report("create", self.backups.create_backup().await)?;

        self.emit(
            AuditEvent::new(&ctx.user_id, AuditAction::BackupCreated)
                .target(&record.filename)
                .after(snapshot(&record)),
        )
        .await;
        Ok(record)
    }

    /// All valid artifacts, newest first, with their total size.
    pub async fn list(&self) -> Result<BackupListing> {
        let backups = report("list", self.metadata.list_artifacts(&self.guard).await)?;
        let total_size = backups.iter().map(|b| b.size_bytes).sum();
        Ok(BackupListing {
            backups,
            total_size,
            total_size_formatted: format_size(total_size),
        })
    }

    /// Sidecar of a valid artifact.
    pub async fn get(&self, name: &str) -> Result<BackupMetadata> {
        let path = self.guard.resolve(name)?;
        report("get", self.valid_metadata(name, &path).await)
    }

    /// Checked on-disk location of a valid artifact, for streamed downloads.
    pub async fn get_file_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.guard.resolve(name)?;
        report("get_file_path", self.valid_metadata(name, &path).await)?;
        Ok(path)
    }

    /// Open a valid artifact for streaming.
    pub async fn open_download(&self, name: &str) -> Result<DownloadHandle> {
        let path = self.get_file_path(name).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| BackupError::io("opening backup for download", e))?;
        let size_bytes = file
            .metadata()
            .await
            .map_err(|e| BackupError::io("reading backup size", e))?
            .len();

        Ok(DownloadHandle {
            filename: name.to_string(),
            path,
            size_bytes,
            file,
        })
    }

    /// Recompute the checksum of a valid artifact and compare with its sidecar.
    pub async fn verify(&self, name: &str) -> Result<VerificationResult> {
        let path = self.guard.resolve(name)?;
        let metadata = report("verify", self.valid_metadata(name, &path).await)?;
        let actual = report("verify", compute_checksum(&path).await)?;

        let valid = actual == metadata.checksum;
        info!(filename = %name, valid = valid, "Backup verified");
        Ok(VerificationResult {
            filename: name.to_string(),
            expected: metadata.checksum,
            actual,
            valid,
        })
    }

    /// Replace the database contents with a backup.
    ///
    /// Verifies the checksum when configured, takes a safety backup unless
    /// disabled, and asks for confirmation unless the request says otherwise.
    pub async fn restore(&self, ctx: &AuthContext, request: &RestoreRequest) -> Result<RestoreResult> {
        ctx.require_admin("restore backup")?;
        self.guard.resolve(&request.target_filename)?;
        let _write = self.write_lock.lock().await;

        let target = self.metadata.read(&request.target_filename).await.ok();
        let result = report("restore", self.restorer.restore(request).await)?;

        let mut event = AuditEvent::new(&ctx.user_id, AuditAction::BackupRestored)
            .target(&request.target_filename)
            .after(snapshot(&result));
        if let Some(target) = target {
            event = event.before(snapshot(&target));
        }
        self.emit(event).await;
        Ok(result)
    }

    /// Remove an artifact and its sidecar (a missing sidecar is tolerated).
    pub async fn delete(&self, ctx: &AuthContext, name: &str) -> Result<()> {
        ctx.require_admin("delete backup")?;
        let path = self.guard.resolve(name)?;
        let _write = self.write_lock.lock().await;

        let before = self.metadata.read(name).await.ok();
        report("delete", self.remove_artifact(name, &path).await)?;

        info!(filename = %name, "Backup deleted");
        let mut event = AuditEvent::new(&ctx.user_id, AuditAction::BackupDeleted).target(name);
        if let Some(before) = before {
            event = event.before(snapshot(&before));
        }
        self.emit(event).await;
        Ok(())
    }

    /// Apply the retention policy to all valid artifacts. Stops at the first
    /// failed deletion; whatever was already removed is still audited.
    pub async fn clean(&self, ctx: &AuthContext) -> Result<CleanupResult> {
        ctx.require_admin("clean backups")?;
        let _write = self.write_lock.lock().await;

        let artifacts = report("clean", self.metadata.list_artifacts(&self.guard).await)?;
        let stale = self.retention.select_for_deletion(&artifacts, Utc::now());

        let mut deleted = Vec::with_capacity(stale.len());
        let mut freed_space = 0;
        let mut failure = None;
        for artifact in &stale {
            let removed = match self.guard.resolve(&artifact.filename) {
                Ok(path) => self.remove_artifact(&artifact.filename, &path).await,
                Err(e) => Err(e),
            };
            if let Err(e) = removed {
                failure = Some(e);
                break;
            }
            freed_space += artifact.size_bytes;
            deleted.push(artifact.filename.clone());
        }

        let result = CleanupResult {
            deleted_count: deleted.len(),
            freed_space,
            kept_count: artifacts.len() - deleted.len(),
            deleted,
        };

        // Deletions that already happened are audited even when a later one fails
        if failure.is_none() || result.deleted_count > 0 {
            let mut after = snapshot(&result);
            if let (Some(e), Value::Object(fields)) = (&failure, &mut after) {
                fields.insert("error".to_string(), json!(e.public_message()));
            }
            self.emit(
                AuditEvent::new(&ctx.user_id, AuditAction::BackupsCleaned)
                    .before(json!({ "count": artifacts.len() }))
                    .after(after),
            )
            .await;
        }

        if let Some(e) = failure {
            warn!(
                deleted = result.deleted_count,
                freed_bytes = result.freed_space,
                "Retention cleanup stopped early"
            );
            return report("clean", Err(e));
        }

        info!(
            deleted = result.deleted_count,
            kept = result.kept_count,
            freed_bytes = result.freed_space,
            "Retention cleanup finished"
        );
        Ok(result)
    }

    async fn valid_metadata(&self, name: &str, path: &Path) -> Result<BackupMetadata> {
        match fs::metadata(path).await {
            Ok(stat) if stat.is_file() => self.metadata.read(name).await,
            Ok(_) => Err(BackupError::NotFound(name.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackupError::NotFound(name.to_string())),
            Err(e) => Err(BackupError::io("reading backup file", e)),
        }
    }

    async fn remove_artifact(&self, name: &str, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackupError::NotFound(name.to_string()))
            }
            Err(e) => return Err(BackupError::io("deleting backup file", e)),
        }
        self.metadata.delete(name).await
    }

    async fn emit(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(e) = self.audit.record(event).await {
            error!(action = %action, error = %e, "Failed to write audit event");
        }
    }
}

/// Log the full error before it leaves the facade; callers show `public_message()`.
fn report<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_rejection() || matches!(e, BackupError::NotFound(_)) {
            info!(operation = operation, error = %e, "Backup request rejected");
        } else {
            error!(operation = operation, error = %e, "Backup operation failed");
        }
    }
    result
}

fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
