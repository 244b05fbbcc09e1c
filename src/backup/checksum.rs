// Streaming artifact checksums (SHA-256, lowercase hex)

use super::types::BackupError;
use crate::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash a file in constant memory. Any read error aborts; no partial digest is returned.
pub async fn compute_checksum(path: &Path) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || checksum_blocking(&path)).await?
}

fn checksum_blocking(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| {
        BackupError::ChecksumFailed(format!("failed to open {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).map_err(|e| {
            BackupError::ChecksumFailed(format!("failed to read {}: {}", path.display(), e))
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
