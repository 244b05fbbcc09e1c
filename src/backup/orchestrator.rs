// Backup Orchestrator - Dump -> Compress -> Checksum -> Metadata
//
// Metadata is the last thing written. Its presence is what makes an artifact
// valid, so any earlier failure leaves at most an unlisted orphan behind.

use super::checksum::compute_checksum;
use super::compression::compress_file;
use super::dump::DumpRunner;
use super::metadata::MetadataStore;
use super::types::{format_size, BackupError, BackupMetadata, BackupRecord};
use crate::config::BackupConfig;
use crate::process::ProcessRunner;
use crate::Result;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Upper bound on `-N` suffixes tried for one timestamp
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Dump, compress, checksum and register one backup.
pub struct BackupOrchestrator {
    config: Arc<BackupConfig>,
    dump: DumpRunner,
    metadata: Arc<MetadataStore>,
}

impl BackupOrchestrator {
    /// Pipeline over `runner`, writing sidecars through `metadata`.
    pub fn new(
        config: Arc<BackupConfig>,
        runner: Arc<dyn ProcessRunner>,
        metadata: Arc<MetadataStore>,
    ) -> Self {
        let dump = DumpRunner::new(runner, config.pg_dump_path.clone());
        Self {
            config,
            dump,
            metadata,
        }
    }

    /// Produce a new artifact. On failure no sidecar is written, so nothing is listed.
    #[instrument(skip(self), fields(database = %self.config.connection.database))]
    pub async fn create_backup(&self) -> Result<BackupRecord> {
        let started = Instant::now();
        let timestamp = Utc::now();

        fs::create_dir_all(&self.config.backup_dir)
            .await
            .map_err(|e| BackupError::io("creating backup directory", e))?;

        let stem = self.reserve_stem(timestamp).await?;
        let sql_path = self.config.backup_dir.join(format!("{}.sql", stem));

        info!(stem = %stem, "Starting database dump");

        if let Err(e) = self.dump.dump(&self.config.connection, &sql_path).await {
            leave_partial(&sql_path, &e);
            return Err(e);
        }

        let final_path = if self.config.compression {
            let gz_path = self.config.backup_dir.join(format!("{}.sql.gz", stem));
            if let Err(e) = compress_file(&sql_path, &gz_path, self.config.compression_level).await {
                leave_partial(&gz_path, &e);
                return Err(e);
            }
            if let Err(e) = fs::remove_file(&sql_path).await {
                warn!(path = %sql_path.display(), error = %e, "Could not remove uncompressed intermediate");
            }
            gz_path
        } else {
            sql_path
        };

        let filename = file_name(&final_path)?;
        let checksum = match compute_checksum(&final_path).await {
            Ok(checksum) => checksum,
            Err(e) => {
                leave_partial(&final_path, &e);
                return Err(e);
            }
        };
        let size_bytes = fs::metadata(&final_path)
            .await
            .map_err(|e| BackupError::io("reading artifact size", e))?
            .len();
        let duration_ms = elapsed_ms(started);

        let metadata = BackupMetadata {
            filename: filename.clone(),
            created_at: timestamp,
            size_bytes,
            size_formatted: format_size(size_bytes),
            checksum: checksum.clone(),
            duration_ms,
            database_name: self.config.connection.database.clone(),
            compressed: self.config.compression,
        };

        if let Err(e) = self.metadata.write(&metadata).await {
            leave_partial(&final_path, &e);
            return Err(e);
        }

        info!(
            filename = %filename,
            size_bytes = size_bytes,
            duration_ms = duration_ms,
            "Backup created successfully"
        );

        Ok(BackupRecord {
            filename,
            path: final_path,
            size_bytes,
            checksum,
            timestamp,
            duration_ms,
        })
    }

    /// Claim `<prefix>-<stamp>[-N]` by creating its `.sql` file exclusively.
    async fn reserve_stem(&self, timestamp: DateTime<Utc>) -> Result<String> {
        let base = format!(
            "{}-{}",
            self.config.prefix,
            timestamp.format("%Y%m%d-%H%M%S")
        );
        let dir = &self.config.backup_dir;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let stem = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };

            let taken = exists(&dir.join(format!("{}.sql.gz", stem))).await
                || exists(&dir.join(format!("{}.json", stem))).await;
            if taken {
                continue;
            }

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(format!("{}.sql", stem)))
                .await
            {
                Ok(_) => return Ok(stem),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(BackupError::io("reserving backup filename", e)),
            }
        }

        Err(BackupError::InvalidName(format!(
            "no free backup name for {} after {} attempts",
            base, MAX_NAME_ATTEMPTS
        )))
    }
}

fn leave_partial(path: &Path, cause: &BackupError) {
    error!(
        path = %path.display(),
        error = %cause,
        "Backup step failed; partial file left in place and not registered"
    );
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(true)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::InvalidName(path.display().to_string()))
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
