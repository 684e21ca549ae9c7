//! Cancellable streaming of package bytes to disk.

use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::RepositoryError;
use crate::utils::progress::{ProgressEvent, ProgressSink};

/// Streams an HTTP response body into `dest`, checking `cancel` before every chunk.
pub async fn stream_response(
    response: reqwest::Response,
    dest: &Path,
    cancel: &CancellationToken,
    progress: &ProgressSink,
) -> Result<u64, RepositoryError> {
    let mut file = File::create(dest).await.map_err(RepositoryError::io(dest))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = chunk else { break };
        let bytes = chunk.map_err(|e| RepositoryError::Network {
            operation: "download package".to_string(),
            reason: e.to_string(),
        })?;
        file.write_all(&bytes).await.map_err(RepositoryError::io(dest))?;
        written += bytes.len() as u64;
        progress.emit(ProgressEvent::Downloaded { bytes: written });
    }

    file.flush().await.map_err(RepositoryError::io(dest))?;
    file.sync_all().await.map_err(RepositoryError::io(dest))?;
    Ok(written)
}

/// Copies a local package into `dest` in chunks, checking `cancel` between them.
pub async fn copy_file(
    src: &Path,
    dest: &Path,
    cancel: &CancellationToken,
    progress: &ProgressSink,
) -> Result<u64, RepositoryError> {
    let mut input = File::open(src).await.map_err(RepositoryError::io(src))?;
    let total = input.metadata().await.map(|m| m.len()).ok();
    progress.emit(ProgressEvent::DownloadStarted {
        name: display_name(src),
        total,
    });

    let mut output = File::create(dest).await.map_err(RepositoryError::io(dest))?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }
        let n = input.read(&mut buf).await.map_err(RepositoryError::io(src))?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await.map_err(RepositoryError::io(dest))?;
        written += n as u64;
        progress.emit(ProgressEvent::Downloaded { bytes: written });
    }
    output.flush().await.map_err(RepositoryError::io(dest))?;
    output.sync_all().await.map_err(RepositoryError::io(dest))?;
    Ok(written)
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".part").to_string())
        .unwrap_or_else(|| path.display().to_string())
}
