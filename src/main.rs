//! `dumpvault` command line interface
//!
//! Configuration comes from the environment (`BACKUP_*`, `DB_*`, `PG_DUMP_PATH`,
//! `PSQL_PATH`); flags override the most common settings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dumpvault::backup::{
    format_size, BackupCatalog, InteractiveConfirmation, RestoreRequest,
};
use dumpvault::config::BackupConfig;
use dumpvault::process::TokioProcessRunner;
use dumpvault::security::{AuditLogger, AuthContext};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dumpvault", version, about = "PostgreSQL backup and restore")]
struct Cli {
    /// Backup directory (overrides BACKUP_DIR)
    #[arg(long, value_name = "DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Operator name recorded in the audit trail
    #[arg(long, env = "BACKUP_ACTOR", default_value = "cli", global = true)]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump the database into a new backup
    Create {
        /// Store the plain SQL dump without gzip
        #[arg(long)]
        no_compress: bool,
    },
    /// List valid backups, newest first
    List,
    /// Recompute a backup's checksum and compare it with its metadata
    Verify { filename: String },
    /// Wipe the target schema and restore a backup into it
    Restore {
        filename: String,
        /// Skip the pre-restore safety backup
        #[arg(long)]
        no_safety_backup: bool,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Delete a backup and its metadata
    Delete { filename: String },
    /// Apply the retention policy
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = BackupConfig::from_env().context("invalid backup configuration")?;
    if let Some(dir) = &cli.backup_dir {
        config.backup_dir = dir.clone();
    }
    if let Command::Create { no_compress: true } = cli.command {
        config.compression = false;
    }

    let runner = Arc::new(TokioProcessRunner::new(config.command_timeout));
    let catalog = BackupCatalog::new(
        config,
        runner,
        Arc::new(AuditLogger::new()),
        Arc::new(InteractiveConfirmation::stdio()),
    )
    .context("failed to initialise backup catalog")?;

    // Whoever can run this binary against the database is treated as an admin
    let operator = AuthContext::admin(cli.actor.clone());

    match &cli.command {
        Command::Create { .. } => {
            let record = catalog.create(&operator).await.context("backup failed")?;
            output(cli.json, &record, || {
                format!(
                    "Created {} ({}, sha256 {}) in {} ms",
                    record.filename,
                    format_size(record.size_bytes),
                    record.checksum,
                    record.duration_ms
                )
            })?;
        }
        Command::List => {
            let listing = catalog.list().await.context("listing backups failed")?;
            output(cli.json, &listing, || {
                let mut lines: Vec<String> = listing
                    .backups
                    .iter()
                    .map(|b| {
                        format!(
                            "{}  {:>10}  {}",
                            b.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                            format_size(b.size_bytes),
                            b.filename
                        )
                    })
                    .collect();
                lines.push(format!(
                    "{} backup(s), {} total",
                    listing.backups.len(),
                    listing.total_size_formatted
                ));
                lines.join("\n")
            })?;
        }
        Command::Verify { filename } => {
            let result = catalog.verify(filename).await.context("verification failed")?;
            output(cli.json, &result, || {
                if result.valid {
                    format!("{}: OK", result.filename)
                } else {
                    format!(
                        "{}: CHECKSUM MISMATCH (expected {}, got {})",
                        result.filename, result.expected, result.actual
                    )
                }
            })?;
            if !result.valid {
                anyhow::bail!("{} failed verification", result.filename);
            }
        }
        Command::Restore {
            filename,
            no_safety_backup,
            yes,
        } => {
            let mut request = RestoreRequest::new(filename.clone())
                .with_safety_backup(!no_safety_backup);
            if *yes {
                request = request.confirmed();
            }
            let result = catalog
                .restore(&operator, &request)
                .await
                .context("restore failed")?;
            output(cli.json, &result, || match &result.safety_backup {
                Some(safety) => format!(
                    "Restored {} in {} ms (safety backup: {})",
                    filename, result.duration_ms, safety
                ),
                None => format!("Restored {} in {} ms", filename, result.duration_ms),
            })?;
        }
        Command::Delete { filename } => {
            catalog
                .delete(&operator, filename)
                .await
                .context("delete failed")?;
            output(cli.json, &serde_json::json!({ "deleted": filename }), || {
                format!("Deleted {}", filename)
            })?;
        }
        Command::Clean => {
            let result = catalog.clean(&operator).await.context("cleanup failed")?;
            output(cli.json, &result, || {
                format!(
                    "Deleted {} backup(s), freed {}, kept {}",
                    result.deleted_count,
                    format_size(result.freed_space),
                    result.kept_count
                )
            })?;
        }
    }

    Ok(())
}

fn output<T, F>(json: bool, value: &T, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce() -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}
