// Backup System Types - Core data structures and the pipeline error taxonomy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A complete, checksummed backup file with a matching sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    /// Bare file name inside the backup directory
    pub filename: String,
    /// Canonical path of the artifact
    pub absolute_path: PathBuf,
    /// Size on disk in bytes
    pub size_bytes: u64,
    /// Hex SHA-256 recorded in the sidecar
    pub checksum: String,
    /// Creation time recorded in the sidecar
    pub created_at: DateTime<Utc>,
    /// Whether the artifact is gzip-compressed
    pub compressed: bool,
}

/// Sidecar document stored next to every artifact as `<stem>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    /// Artifact file name, including the `.sql` or `.sql.gz` suffix
    pub filename: String,
    /// When the dump started
    pub created_at: DateTime<Utc>,
    /// Size of the final artifact in bytes
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// `size_bytes` rendered by [`format_size`]
    pub size_formatted: String,
    /// Hex SHA-256 of the final artifact
    pub checksum: String,
    /// Wall time from dump start to finished artifact
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Database the dump was taken from
    #[serde(rename = "database")]
    pub database_name: String,
    /// Whether the artifact is gzip-compressed
    pub compressed: bool,
}

/// Returned by a successful `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Artifact file name
    pub filename: String,
    /// Absolute artifact path
    pub path: PathBuf,
    /// Final size in bytes
    pub size_bytes: u64,
    /// Hex SHA-256 of the artifact
    pub checksum: String,
    /// Creation time, same as the sidecar's `createdAt`
    pub timestamp: DateTime<Utc>,
    /// Pipeline duration in milliseconds
    pub duration_ms: u64,
}

/// Result of `list`: valid artifacts, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupListing {
    /// Artifacts sorted by `created_at`, newest first
    pub backups: Vec<BackupArtifact>,
    /// Sum of `size_bytes` over `backups`
    pub total_size: u64,
    /// `total_size` rendered by [`format_size`]
    pub total_size_formatted: String,
}

/// Which backup to restore and how carefully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    /// Artifact file name to restore from
    pub target_filename: String,
    /// Dump the current database before touching it
    pub create_safety_backup: bool,
    /// Bypass the confirmation provider
    pub skip_confirmation: bool,
}

impl RestoreRequest {
    /// Request with a safety backup and interactive confirmation.
    pub fn new(target_filename: impl Into<String>) -> Self {
        Self {
            target_filename: target_filename.into(),
            create_safety_backup: true,
            skip_confirmation: false,
        }
    }

    /// Enable or disable the pre-restore safety backup.
    pub fn with_safety_backup(mut self, enabled: bool) -> Self {
        self.create_safety_backup = enabled;
        self
    }

    /// Mark the request as already confirmed.
    pub fn confirmed(mut self) -> Self {
        self.skip_confirmation = true;
        self
    }
}

/// Outcome of a completed restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    /// Always true; failures are returned as errors
    pub success: bool,
    /// Whether a safety backup was taken first
    pub safety_backup_created: bool,
    /// File name of the safety backup, if one was taken
    pub safety_backup: Option<String>,
    /// Wall time of the whole restore in milliseconds
    pub duration_ms: u64,
}

/// Outcome of a retention run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    /// Number of artifacts removed
    pub deleted_count: usize,
    /// Bytes released by the deleted artifacts
    pub freed_space: u64,
    /// Number of artifacts left in place
    pub kept_count: usize,
    /// File names of the deleted artifacts
    pub deleted: Vec<String>,
}

/// Recorded versus recomputed checksum for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Artifact file name
    pub filename: String,
    /// Checksum from the sidecar
    pub expected: String,
    /// Checksum of the file as it is now
    pub actual: String,
    /// `expected == actual`
    pub valid: bool,
}

/// Errors raised anywhere in the backup and restore pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Name is not `<prefix>-*.sql` or `<prefix>-*.sql.gz`
    #[error("Invalid backup filename: {0}")]
    InvalidName(String),
    /// Name contains a separator or `..`, or resolves outside the base directory
    #[error("Path escapes the backup directory: {0}")]
    PathTraversal(String),
    /// No artifact with that name exists
    #[error("Backup not found: {0}")]
    NotFound(String),
    /// pg_dump exited non-zero, was killed, or produced nothing
    #[error("Dump failed (exit code {exit_code:?}): {stderr}")]
    DumpFailed {
        /// `None` when the process was terminated by a signal
        exit_code: Option<i32>,
        /// Last lines of stderr, credentials redacted
        stderr: String,
    },
    /// psql exited non-zero or was killed
    #[error("Restore failed (exit code {exit_code:?}): {stderr}")]
    RestoreFailed {
        /// `None` when the process was terminated by a signal
        exit_code: Option<i32>,
        /// Last lines of stderr, credentials redacted
        stderr: String,
    },
    /// Filesystem operation failed
    #[error("IO error while {context}: {source}")]
    Io {
        /// What the pipeline was doing
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Gzip stream could not be written or read
    #[error("Compression error: {0}")]
    CompressionFailed(String),
    /// Artifact could not be hashed
    #[error("Checksum error: {0}")]
    ChecksumFailed(String),
    /// Artifact no longer matches its recorded checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum from the sidecar
        expected: String,
        /// Checksum of the file on disk
        actual: String,
    },
    /// Sidecar missing, unreadable or malformed
    #[error("Metadata error: {0}")]
    Metadata(String),
    /// The pre-restore dump failed; nothing destructive ran
    #[error("Safety backup failed, restore aborted: {0}")]
    SafetyBackupFailed(Box<BackupError>),
    /// Operator answered anything but yes
    #[error("Restore was not confirmed")]
    ConfirmationDeclined,
    /// Caller lacks the admin role
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// External utility exceeded the configured timeout and was killed
    #[error("{program} did not finish within {seconds}s")]
    Timeout {
        /// Binary name, without directory
        program: String,
        /// Configured limit
        seconds: u64,
    },
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BackupError {
    /// Wrap an I/O error with what the pipeline was doing.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Message safe to hand to API callers: no stderr, no absolute paths.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidName(_) => "Invalid backup filename".to_string(),
            Self::PathTraversal(_) => "Invalid backup filename".to_string(),
            Self::NotFound(name) => format!("Backup not found: {}", name),
            Self::DumpFailed { .. } => "Database dump failed".to_string(),
            Self::RestoreFailed { .. } => "Database restore failed".to_string(),
            Self::Io { .. } => "Backup storage I/O failed".to_string(),
            Self::CompressionFailed(_) => "Backup compression failed".to_string(),
            Self::ChecksumFailed(_) => "Backup checksum computation failed".to_string(),
            Self::ChecksumMismatch { .. } => "Backup failed integrity verification".to_string(),
            Self::Metadata(_) => "Backup metadata could not be read or written".to_string(),
            Self::SafetyBackupFailed(_) => {
                "Safety backup failed; restore was not attempted".to_string()
            }
            Self::ConfirmationDeclined => "Restore was not confirmed".to_string(),
            Self::PermissionDenied(_) => "Permission denied".to_string(),
            Self::Timeout { .. } => "Database utility timed out".to_string(),
            Self::Config(_) => "Backup service is misconfigured".to_string(),
            Self::Join(_) => "Internal error".to_string(),
        }
    }

    /// True for errors raised before any filesystem access.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_) | Self::PathTraversal(_) | Self::PermissionDenied(_)
        )
    }
}

/// Human-readable byte count, base 1024 (`1.5 KB`, `12 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
