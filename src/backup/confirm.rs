//! Operator confirmation before destructive restores

use super::types::BackupError;
use crate::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Asks whoever is driving the restore to approve it
#[async_trait]
pub trait ConfirmationProvider: Send + Sync {
    /// `Ok(true)` to proceed, `Ok(false)` to abort.
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Headless callers: always approves
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationProvider for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Prompts on a terminal-like stream and accepts `y` / `yes`
pub struct InteractiveConfirmation<R, W> {
    io: Mutex<(R, W)>,
}

impl InteractiveConfirmation<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Prompt on stdout, read the answer from stdin.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> InteractiveConfirmation<R, W> {
    /// Prompt on `writer`, read one line from `reader`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }
}

#[async_trait]
impl<R, W> ConfirmationProvider for InteractiveConfirmation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        let mut guard = self.io.lock().await;
        let (reader, writer) = &mut *guard;

        writer
            .write_all(format!("{} [y/N]: ", prompt).as_bytes())
            .await
            .map_err(|e| BackupError::io("writing confirmation prompt", e))?;
        writer
            .flush()
            .await
            .map_err(|e| BackupError::io("writing confirmation prompt", e))?;

        let mut answer = String::new();
        reader
            .read_line(&mut answer)
            .await
            .map_err(|e| BackupError::io("reading confirmation", e))?;

        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}
