//! # dumpvault
//!
//! Full logical PostgreSQL backups that are never half-registered.
//!
//! ## Overview
//!
//! A backup is produced by `pg_dump`, optionally gzip-compressed, checksummed,
//! and only then described by a JSON sidecar. An artifact counts as a backup
//! only when both the file and its sidecar exist, so a failed run never shows
//! up in listings.
//!
//! Restores are destructive: the target schema is dropped and recreated before
//! the dump is replayed. Unless explicitly disabled, a fresh safety backup must
//! succeed before anything is dropped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dumpvault::backup::{BackupCatalog, RestoreRequest};
//! use dumpvault::config::BackupConfig;
//! use dumpvault::security::AuthContext;
//!
//! # async fn example() -> dumpvault::Result<()> {
//! let catalog = BackupCatalog::with_defaults(BackupConfig::from_env()?)?;
//! let admin = AuthContext::admin("ops");
//!
//! let record = catalog.create(&admin).await?;
//! println!("created {} ({} bytes)", record.filename, record.size_bytes);
//!
//! let request = RestoreRequest::new(record.filename).confirmed();
//! let result = catalog.restore(&admin, &request).await?;
//! assert!(result.safety_backup_created);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`backup`]: pipeline components and the [`backup::BackupCatalog`] facade
//! - [`config`]: configuration built once at startup
//! - [`process`]: subprocess capability used for `pg_dump` / `psql`
//! - [`security`]: principal context and audit trail

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Result type for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

pub use backup::BackupError;

/// Backup, retention and restore pipeline
pub mod backup;

/// Service configuration
pub mod config;

/// External process execution
pub mod process;

/// Authorization context and audit logging
pub mod security;
