//! Subprocess execution for the external database utilities
//!
//! Orchestration code only sees the [`ProcessRunner`] trait, so tests can
//! substitute a scripted runner for `pg_dump` and `psql`.

use crate::backup::BackupError;
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// A fully described external command
#[derive(Clone, PartialEq)]
pub struct CommandSpec {
    /// Binary to execute
    pub program: PathBuf,
    /// Arguments, passed without a shell
    pub args: Vec<String>,
    /// Extra environment; values may be secrets and are never logged
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Command with no arguments and no extra environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value following `flag` in the argument list, if present.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }

    /// Binary name without its directory, for logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout, lossily decoded
    pub stdout: String,
    /// Captured stderr, lossily decoded
    pub stderr: String,
}

impl ProcessOutput {
    /// Exited normally with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability to run an external command to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` and capture its output. A non-zero exit is not an error here.
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput>;
}

/// Runs commands with `tokio::process`, optionally bounded by a deadline
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    timeout: Option<Duration>,
}

impl TokioProcessRunner {
    /// Kill children that outlive `timeout`.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    #[instrument(skip(self), fields(program = %command.program_name()))]
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput> {
        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(args = ?command.args, "Spawning external command");

        let output = match self.timeout {
            // Dropping the future on expiry kills the child
            Some(limit) => tokio::time::timeout(limit, child.output())
                .await
                .map_err(|_| BackupError::Timeout {
                    program: command.program_name(),
                    seconds: limit.as_secs(),
                })?,
            None => child.output().await,
        }
        .map_err(|e| BackupError::io(format!("running {}", command.program_name()), e))?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Stderr lines that carry none of the advisory `markers`.
pub fn non_advisory_lines<'a>(stderr: &'a str, markers: &[&str]) -> Vec<&'a str> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !markers.iter().any(|marker| line.contains(marker)))
        .collect()
}

/// Last `max_lines` non-empty lines of stderr, for error reporting.
pub fn stderr_excerpt(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
