// Shared test doubles for the backup pipeline
#![allow(dead_code)]

use async_trait::async_trait;
use dumpvault::backup::{
    AutoConfirm, BackupCatalog, BackupError, ConfirmationProvider, MetadataStore,
};
use dumpvault::config::{BackupConfig, ConnectionConfig};
use dumpvault::process::{CommandSpec, ProcessOutput, ProcessRunner};
use dumpvault::security::{AuditLogger, AuthContext};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const DUMP_HEADER: &str = "-- fake pg_dump\n";

/// Which utility a recorded command stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Dump,
    ResetSchema,
    Restore,
}

/// Ways the fake pg_dump can misbehave while still producing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFault {
    #[default]
    None,
    /// Partial dump, warning on stderr, terminated by a signal
    Killed,
    /// Replaces the output file with a directory nothing can read as a file
    DirectoryOutput,
    /// Succeeds, but leaves a directory where the sidecar temp file goes
    BlockSidecar,
}

/// Stands in for pg_dump/psql against an in-memory "database" whose
/// contents are one SQL statement per line.
#[derive(Default)]
pub struct FakeDatabase {
    pub rows: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<(Step, CommandSpec)>>,
    pub fail_dump: AtomicBool,
    pub fail_reset: AtomicBool,
    pub fail_restore: AtomicBool,
    pub kill_restore: AtomicBool,
    pub dump_fault: Mutex<DumpFault>,
}

impl FakeDatabase {
    pub fn with_rows(rows: &[&str]) -> Arc<Self> {
        let db = Self::default();
        *db.rows.lock().unwrap() = rows.iter().map(|r| r.to_string()).collect();
        Arc::new(db)
    }

    pub fn rows(&self) -> Vec<String> {
        self.rows.lock().unwrap().clone()
    }

    pub fn set_rows(&self, rows: &[&str]) {
        *self.rows.lock().unwrap() = rows.iter().map(|r| r.to_string()).collect();
    }

    pub fn set_dump_fault(&self, fault: DumpFault) {
        *self.dump_fault.lock().unwrap() = fault;
    }

    pub fn steps(&self) -> Vec<Step> {
        self.calls.lock().unwrap().iter().map(|(step, _)| *step).collect()
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().iter().map(|(_, spec)| spec.clone()).collect()
    }

    fn failure(stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

fn ok() -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(0),
        ..ProcessOutput::default()
    }
}

#[async_trait]
impl ProcessRunner for FakeDatabase {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, BackupError> {
        let step = if command.program_name() == "pg_dump" {
            Step::Dump
        } else if command.arg_value("--command").is_some() {
            Step::ResetSchema
        } else {
            Step::Restore
        };
        self.calls.lock().unwrap().push((step, command.clone()));

        match step {
            Step::Dump => {
                if self.fail_dump.load(Ordering::SeqCst) {
                    return Ok(Self::failure("pg_dump: error: connection to server failed"));
                }
                let file = command.arg_value("--file").expect("pg_dump --file");
                let mut body = DUMP_HEADER.to_string();
                for row in self.rows() {
                    body.push_str(&row);
                    body.push('\n');
                }
                let fault = *self.dump_fault.lock().unwrap();
                match fault {
                    DumpFault::None => {}
                    DumpFault::Killed => {
                        std::fs::write(file, &body[..body.len() / 2]).expect("write partial dump");
                        return Ok(ProcessOutput {
                            exit_code: None,
                            stdout: String::new(),
                            stderr: "pg_dump: WARNING: could not obtain lock\n".to_string(),
                        });
                    }
                    DumpFault::DirectoryOutput => {
                        std::fs::remove_file(file).expect("remove reserved dump file");
                        std::fs::create_dir(file).expect("create dump directory");
                        std::fs::write(Path::new(file).join("data.sql"), body).expect("write nested");
                        return Ok(ok());
                    }
                    DumpFault::BlockSidecar => {
                        let stem = file.strip_suffix(".sql").expect("dump target ends in .sql");
                        std::fs::create_dir(format!("{}.json.tmp", stem)).expect("block sidecar");
                    }
                }
                std::fs::write(file, body).expect("write fake dump");
                Ok(ok())
            }
            Step::ResetSchema => {
                if self.fail_reset.load(Ordering::SeqCst) {
                    return Ok(Self::failure("ERROR: permission denied for schema public"));
                }
                self.rows.lock().unwrap().clear();
                Ok(ok())
            }
            Step::Restore => {
                if self.fail_restore.load(Ordering::SeqCst) {
                    return Ok(Self::failure("psql:dump.sql:3: ERROR: syntax error"));
                }
                let file = command.arg_value("--file").expect("psql --file");
                let body = std::fs::read_to_string(file).expect("read fake dump");
                if self.kill_restore.load(Ordering::SeqCst) {
                    // Only the first statement lands before the process dies
                    let applied: Vec<String> = body
                        .lines()
                        .filter(|line| !line.starts_with("--") && !line.is_empty())
                        .take(1)
                        .map(str::to_string)
                        .collect();
                    *self.rows.lock().unwrap() = applied;
                    return Ok(ProcessOutput {
                        exit_code: None,
                        stdout: String::new(),
                        stderr: "NOTICE: restoring\n".to_string(),
                    });
                }
                let rows = body
                    .lines()
                    .filter(|line| !line.starts_with("--") && !line.is_empty())
                    .map(str::to_string)
                    .collect();
                *self.rows.lock().unwrap() = rows;
                Ok(ProcessOutput {
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr: "NOTICE: restoring\n".to_string(),
                })
            }
        }
    }
}

/// Confirmation provider with a fixed answer that counts prompts
#[derive(Default)]
pub struct FixedAnswer {
    pub answer: bool,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ConfirmationProvider for FixedAnswer {
    async fn confirm(&self, prompt: &str) -> Result<bool, BackupError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer)
    }
}

pub fn test_config(dir: &Path) -> BackupConfig {
    BackupConfig::new(dir)
        .with_prefix("backup")
        .with_retention(30, 5)
        .with_connection(ConnectionConfig {
            password: Some("hunter2".to_string()),
            database: "shop".to_string(),
            ..ConnectionConfig::default()
        })
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub db: Arc<FakeDatabase>,
    pub audit: AuditLogger,
    pub catalog: BackupCatalog,
    pub admin: AuthContext,
}

impl Harness {
    pub fn new(rows: &[&str]) -> Self {
        Self::build(rows, |config| config, Arc::new(AutoConfirm))
    }

    pub fn build(
        rows: &[&str],
        configure: impl FnOnce(BackupConfig) -> BackupConfig,
        confirmation: Arc<dyn ConfirmationProvider>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeDatabase::with_rows(rows);
        let audit = AuditLogger::new();
        let config = configure(test_config(dir.path()));
        let catalog =
            BackupCatalog::new(config, db.clone(), Arc::new(audit.clone()), confirmation).unwrap();

        Self {
            dir,
            db,
            audit,
            catalog,
            admin: AuthContext::admin("ops-admin"),
        }
    }

    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub fn store(&self) -> MetadataStore {
        MetadataStore::new(self.dir.path())
    }

    /// Every file name in the backup directory, sorted
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn gunzip(path: &Path) -> String {
    use std::io::Read;
    let file = std::fs::File::open(path).unwrap();
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    text
}
