// pg_dump invocation

use super::types::BackupError;
use crate::config::ConnectionConfig;
use crate::process::{non_advisory_lines, stderr_excerpt, CommandSpec, ProcessRunner};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stderr markers that mark a successful pg_dump's output as routine
const DUMP_ADVISORY_MARKERS: &[&str] = &["WARNING"];
const EXCERPT_LINES: usize = 20;

/// Runs pg_dump into a reserved output file.
pub struct DumpRunner {
    runner: Arc<dyn ProcessRunner>,
    pg_dump_path: PathBuf,
}

impl DumpRunner {
    /// Use `pg_dump_path` as the pg_dump binary.
    pub fn new(runner: Arc<dyn ProcessRunner>, pg_dump_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            pg_dump_path: pg_dump_path.into(),
        }
    }

    /// The pg_dump command line; the password travels only in `PGPASSWORD`.
    pub fn command(&self, connection: &ConnectionConfig, output_path: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.pg_dump_path)
            .args(["--host", connection.host.as_str()])
            .args(["--port".to_string(), connection.port.to_string()])
            .args(["--username", connection.user.as_str()])
            .args(["--dbname", connection.database.as_str()])
            .args(["--format", "plain", "--no-owner", "--no-privileges", "--no-password"])
            .arg("--file")
            .arg(output_path.to_string_lossy());

        if let Some(password) = &connection.password {
            spec = spec.env("PGPASSWORD", password.as_str());
        }
        spec
    }

    /// Write a plain SQL dump of `connection.database` to `output_path`.
    pub async fn dump(&self, connection: &ConnectionConfig, output_path: &Path) -> Result<()> {
        let spec = self.command(connection, output_path);
        let output = self.runner.run(&spec).await?;

        if !output.success() {
            return Err(BackupError::DumpFailed {
                exit_code: output.exit_code,
                stderr: stderr_excerpt(&output.stderr, EXCERPT_LINES),
            });
        }

        if !output.stderr.trim().is_empty() {
            let excerpt = stderr_excerpt(&output.stderr, EXCERPT_LINES);
            if non_advisory_lines(&output.stderr, DUMP_ADVISORY_MARKERS).is_empty() {
                info!(stderr = %excerpt, "pg_dump reported warnings");
            } else {
                warn!(stderr = %excerpt, "pg_dump wrote unexpected output to stderr");
            }
        }

        // A zero exit with no output is still a failed dump
        let size = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(BackupError::DumpFailed {
                exit_code: output.exit_code,
                stderr: "pg_dump produced no output".to_string(),
            });
        }

        debug!(output = %output_path.display(), size_bytes = size, "pg_dump finished");
        Ok(())
    }
}
