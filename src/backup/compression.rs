// Streaming gzip for backup artifacts
//
// Both directions copy through fixed-size buffers on the blocking pool, so
// dumps larger than memory are fine. A failed run leaves `dst` in an
// undefined state; callers must not register it.

use super::types::BackupError;
use crate::Result;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Gzip `src` into `dst` at `level` (clamped to 9). Returns the uncompressed byte count.
pub async fn compress_file(src: &Path, dst: &Path, level: u32) -> Result<u64> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || compress_blocking(&src, &dst, level.min(9))).await?
}

/// Inflate `src` into `dst`, accepting multi-member gzip. Returns the bytes written.
pub async fn decompress_file(src: &Path, dst: &Path) -> Result<u64> {
    let (src, dst): (PathBuf, PathBuf) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || decompress_blocking(&src, &dst)).await?
}

fn compress_blocking(src: &Path, dst: &Path, level: u32) -> Result<u64> {
    let input = File::open(src)
        .map_err(|e| BackupError::CompressionFailed(format!("failed to open {}: {}", src.display(), e)))?;
    let output = File::create(dst)
        .map_err(|e| BackupError::CompressionFailed(format!("failed to create {}: {}", dst.display(), e)))?;

    let mut reader = BufReader::with_capacity(IO_BUFFER_SIZE, input);
    let mut encoder = GzEncoder::new(BufWriter::with_capacity(IO_BUFFER_SIZE, output), Compression::new(level));

    let copied = io::copy(&mut reader, &mut encoder)
        .map_err(|e| BackupError::CompressionFailed(format!("failed to compress data: {}", e)))?;

    let mut writer = encoder
        .finish()
        .map_err(|e| BackupError::CompressionFailed(format!("failed to finalize compression: {}", e)))?;
    writer
        .flush()
        .map_err(|e| BackupError::CompressionFailed(format!("failed to flush {}: {}", dst.display(), e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| BackupError::CompressionFailed(format!("failed to sync {}: {}", dst.display(), e)))?;

    debug!(src = %src.display(), dst = %dst.display(), bytes_in = copied, "Compressed artifact");
    Ok(copied)
}

fn decompress_blocking(src: &Path, dst: &Path) -> Result<u64> {
    let input = File::open(src)
        .map_err(|e| BackupError::CompressionFailed(format!("failed to open {}: {}", src.display(), e)))?;
    let output = File::create(dst)
        .map_err(|e| BackupError::CompressionFailed(format!("failed to create {}: {}", dst.display(), e)))?;

    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(IO_BUFFER_SIZE, input));
    let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, output);

    let copied = io::copy(&mut decoder, &mut writer)
        .map_err(|e| BackupError::CompressionFailed(format!("failed to decompress data: {}", e)))?;
    writer
        .flush()
        .map_err(|e| BackupError::CompressionFailed(format!("failed to flush {}: {}", dst.display(), e)))?;

    debug!(src = %src.display(), dst = %dst.display(), bytes_out = copied, "Decompressed artifact");
    Ok(copied)
}
