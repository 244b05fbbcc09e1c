// psql invocation: destructive schema reset and SQL replay

use super::types::BackupError;
use crate::config::ConnectionConfig;
use crate::process::{non_advisory_lines, stderr_excerpt, CommandSpec, ProcessOutput, ProcessRunner};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Stderr markers that mark a successful psql run's output as routine
const RESTORE_ADVISORY_MARKERS: &[&str] = &["WARNING", "NOTICE"];
const EXCERPT_LINES: usize = 20;

/// Runs psql for the schema reset and the dump replay.
pub struct RestoreRunner {
    runner: Arc<dyn ProcessRunner>,
    psql_path: PathBuf,
}

impl RestoreRunner {
    /// Use `psql_path` as the psql binary.
    pub fn new(runner: Arc<dyn ProcessRunner>, psql_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            psql_path: psql_path.into(),
        }
    }

    fn base_command(&self, connection: &ConnectionConfig) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.psql_path)
            .args(["--host", connection.host.as_str()])
            .args(["--port".to_string(), connection.port.to_string()])
            .args(["--username", connection.user.as_str()])
            .args(["--dbname", connection.database.as_str()])
            .args(["--no-password", "--quiet", "--no-psqlrc"])
            .args(["--set", "ON_ERROR_STOP=1"]);

        if let Some(password) = &connection.password {
            spec = spec.env("PGPASSWORD", password.as_str());
        }
        spec
    }

    /// SQL that empties the target schema. The schema name is validated by
    /// `BackupConfig::validate` and additionally quoted here.
    pub fn reset_sql(schema: &str) -> String {
        let quoted = format!("\"{}\"", schema.replace('"', "\"\""));
        format!(
            "DROP SCHEMA IF EXISTS {quoted} CASCADE; CREATE SCHEMA {quoted};",
            quoted = quoted
        )
    }

    /// Single-transaction psql call running [`Self::reset_sql`].
    pub fn reset_command(&self, connection: &ConnectionConfig) -> CommandSpec {
        self.base_command(connection)
            .arg("--single-transaction")
            .arg("--command")
            .arg(Self::reset_sql(&connection.schema))
    }

    /// psql call replaying `input_path` with `ON_ERROR_STOP`.
    pub fn restore_command(&self, connection: &ConnectionConfig, input_path: &Path) -> CommandSpec {
        self.base_command(connection)
            .arg("--file")
            .arg(input_path.to_string_lossy())
    }

    /// Drop and recreate the target schema. Irreversible.
    pub async fn reset_schema(&self, connection: &ConnectionConfig) -> Result<()> {
        warn!(
            database = %connection.database,
            schema = %connection.schema,
            "Dropping and recreating schema before restore"
        );
        let output = self.runner.run(&self.reset_command(connection)).await?;
        classify(output, "schema reset")
    }

    /// Replay a plain SQL dump into the (freshly reset) database.
    pub async fn restore(&self, connection: &ConnectionConfig, input_path: &Path) -> Result<()> {
        let output = self
            .runner
            .run(&self.restore_command(connection, input_path))
            .await?;
        classify(output, "restore")?;
        info!(database = %connection.database, input = %input_path.display(), "psql restore finished");
        Ok(())
    }
}

fn classify(output: ProcessOutput, step: &str) -> Result<()> {
    if !output.success() {
        return Err(BackupError::RestoreFailed {
            exit_code: output.exit_code,
            stderr: stderr_excerpt(&output.stderr, EXCERPT_LINES),
        });
    }

    if !output.stderr.trim().is_empty() {
        let excerpt = stderr_excerpt(&output.stderr, EXCERPT_LINES);
        if non_advisory_lines(&output.stderr, RESTORE_ADVISORY_MARKERS).is_empty() {
            info!(step = step, stderr = %excerpt, "psql reported notices");
        } else {
            warn!(step = step, stderr = %excerpt, "psql wrote unexpected output to stderr");
        }
    }
    Ok(())
}
