//! Backup service configuration
//!
//! Built once at startup (usually via [`BackupConfig::from_env`]) and shared
//! with every pipeline component behind an `Arc`.

use crate::backup::BackupError;
use crate::Result;
use regex::Regex;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// PostgreSQL connection parameters handed to `pg_dump` / `psql`
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server host name or socket directory
    pub host: String,
    /// Server port
    pub port: u16,
    /// Role to connect as
    pub user: String,
    /// Passed to subprocesses as `PGPASSWORD`, never as an argument
    pub password: Option<String>,
    /// Database to dump and restore
    pub database: String,
    /// Schema wiped and recreated before a restore
    pub schema: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            schema: "public".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Backup pipeline configuration
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory holding artifacts and sidecars
    pub backup_dir: PathBuf,
    /// Artifact filename prefix (`<prefix>-<timestamp>.sql[.gz]`)
    pub prefix: String,
    /// Age in days after which `clean` deletes artifacts outside the floor
    pub retention_days: u32,
    /// Newest backups always kept by `clean`, regardless of age
    pub min_keep: usize,
    /// Gzip new artifacts
    pub compression: bool,
    /// Gzip level, 0 to 9
    pub compression_level: u32,
    /// pg_dump binary, resolved through `PATH` when bare
    pub pg_dump_path: PathBuf,
    /// psql binary, resolved through `PATH` when bare
    pub psql_path: PathBuf,
    /// Deadline for each external utility; `None` waits forever
    pub command_timeout: Option<Duration>,
    /// Recompute the checksum before restoring
    pub verify_before_restore: bool,
    /// Database to back up and restore
    pub connection: ConnectionConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./backups"),
            prefix: "backup".to_string(),
            retention_days: 30,
            min_keep: 5,
            compression: true,
            compression_level: 6,
            pg_dump_path: PathBuf::from("pg_dump"),
            psql_path: PathBuf::from("psql"),
            command_timeout: Some(Duration::from_secs(3600)),
            verify_before_restore: true,
            connection: ConnectionConfig::default(),
        }
    }
}

impl BackupConfig {
    /// Defaults with a different backup directory.
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            ..Self::default()
        }
    }

    /// Set the artifact prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the age cutoff and the keep floor.
    pub fn with_retention(mut self, retention_days: u32, min_keep: usize) -> Self {
        self.retention_days = retention_days;
        self.min_keep = min_keep;
        self
    }

    /// Enable or disable gzip.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set the gzip level, clamped to 9.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Set the per-utility deadline.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Enable or disable the pre-restore checksum check.
    pub fn with_verify_before_restore(mut self, enabled: bool) -> Self {
        self.verify_before_restore = enabled;
        self
    }

    /// Replace the connection parameters.
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Build a configuration from `BACKUP_*`, `PG_*_PATH` and `DB_*` variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let connection_defaults = ConnectionConfig::default();

        let command_timeout = match parse_var::<u64>("BACKUP_COMMAND_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.command_timeout,
        };

        let connection = ConnectionConfig {
            host: string_var("DB_HOST").unwrap_or(connection_defaults.host),
            port: parse_var("DB_PORT")?.unwrap_or(connection_defaults.port),
            user: string_var("DB_USER").unwrap_or(connection_defaults.user),
            password: string_var("DB_PASSWORD"),
            database: string_var("DB_NAME").unwrap_or(connection_defaults.database),
            schema: string_var("DB_SCHEMA").unwrap_or(connection_defaults.schema),
        };

        let config = Self {
            backup_dir: string_var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
            prefix: string_var("BACKUP_PREFIX").unwrap_or(defaults.prefix),
            retention_days: parse_var("BACKUP_RETENTION_DAYS")?.unwrap_or(defaults.retention_days),
            min_keep: parse_var("BACKUP_MIN_KEEP")?.unwrap_or(defaults.min_keep),
            compression: parse_bool_var("BACKUP_COMPRESSION")?.unwrap_or(defaults.compression),
            compression_level: parse_var::<u32>("BACKUP_COMPRESSION_LEVEL")?
                .map(|level| level.min(9))
                .unwrap_or(defaults.compression_level),
            pg_dump_path: string_var("PG_DUMP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.pg_dump_path),
            psql_path: string_var("PSQL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.psql_path),
            command_timeout,
            verify_before_restore: parse_bool_var("BACKUP_VERIFY_BEFORE_RESTORE")?
                .unwrap_or(defaults.verify_before_restore),
            connection,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would produce unsafe filenames or SQL.
    pub fn validate(&self) -> Result<()> {
        let prefix_pattern = Regex::new(r"^[A-Za-z0-9_]+(-[A-Za-z0-9_]+)*$")
            .map_err(|e| BackupError::Config(e.to_string()))?;
        if !prefix_pattern.is_match(&self.prefix) {
            return Err(BackupError::Config(format!(
                "backup prefix must be alphanumeric/underscore words joined by '-', got {:?}",
                self.prefix
            )));
        }

        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| BackupError::Config(e.to_string()))?;
        if !identifier.is_match(&self.connection.schema) {
            return Err(BackupError::Config(format!(
                "schema must be a plain SQL identifier, got {:?}",
                self.connection.schema
            )));
        }

        if self.connection.database.is_empty() {
            return Err(BackupError::Config("database name is empty".to_string()));
        }

        Ok(())
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match string_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| BackupError::Config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}

fn parse_bool_var(name: &str) -> Result<Option<bool>> {
    match string_var(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(BackupError::Config(format!(
                "{}={:?}: expected a boolean",
                name, raw
            ))),
        },
        None => Ok(None),
    }
}
