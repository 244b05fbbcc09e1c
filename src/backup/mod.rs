// Backup and Restore Pipeline
// Full logical dumps with streaming compression, checksums, sidecar metadata,
// retention pruning and guarded restore

/// Public facade: admin checks, auditing and error mapping
pub mod catalog;
/// Streaming SHA-256 of artifacts
pub mod checksum;
/// Gzip compression and decompression of dump files
pub mod compression;
/// Confirmation prompts before destructive restores
pub mod confirm;
/// pg_dump invocation
pub mod dump;
/// Sidecar JSON documents
pub mod metadata;
/// Backup creation pipeline
pub mod orchestrator;
/// Filename validation and containment in the backup directory
pub mod path_guard;
/// Restore pipeline with safety backup
pub mod restore;
/// psql invocation for schema reset and replay
pub mod restore_runner;
/// Retention policy
pub mod retention;
/// Shared records and the error type
pub mod types;

pub use catalog::{BackupCatalog, DownloadHandle};
pub use confirm::{AutoConfirm, ConfirmationProvider, InteractiveConfirmation};
pub use dump::DumpRunner;
pub use metadata::MetadataStore;
pub use orchestrator::BackupOrchestrator;
pub use path_guard::PathGuard;
pub use restore::RestoreOrchestrator;
pub use restore_runner::RestoreRunner;
pub use retention::{select_for_deletion, RetentionDecision, RetentionPolicy};
pub use types::{
    format_size, BackupArtifact, BackupError, BackupListing, BackupMetadata, BackupRecord,
    CleanupResult, RestoreRequest, RestoreResult, VerificationResult,
};
