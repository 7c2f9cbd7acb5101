//! Streaming a response body into place.
//!
//! Bytes go to `<dest>.downloading`; the temp file is renamed over `dest`
//! only after the stream ended cleanly and its size matched the advertised
//! length. Every failure path removes the temp file before returning.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::types::StreamLimits;
use crate::http_client::TransportErrorKind;
use crate::services::context::Transport;
use crate::utils::temp_path_for;

/// Why a single download attempt failed.
#[derive(Debug, Error)]
pub enum DownloadFailure {
    #[error("{kind}: {message}")]
    Request {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("HTTP {0}")]
    Status(u16),

    #[error("stalled: no data for {0:?}")]
    Stalled(Duration),

    #[error("transfer exceeded {0:?}")]
    OverallTimeout(Duration),

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("stream interrupted ({kind}): {message}")]
    Stream {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the retry state machine treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connection, HTTP and integrity failures: fail over and retry.
    Transient,
    /// The origin reported an internal error; never retried.
    OriginPermanent,
    /// Local filesystem trouble; the remote side is not at fault.
    Local,
}

impl DownloadFailure {
    pub fn class(&self) -> FailureClass {
        match self {
            DownloadFailure::Status(500) => FailureClass::OriginPermanent,
            DownloadFailure::Io { .. } => FailureClass::Local,
            _ => FailureClass::Transient,
        }
    }

    /// The transport kind to report against the proxy that carried the
    /// request, when the failure could be the proxy's fault.
    pub fn proxy_kind(&self) -> Option<TransportErrorKind> {
        match self {
            DownloadFailure::Stream { kind, .. } if kind.is_proxy_attributable() => Some(*kind),
            DownloadFailure::Stalled(_) => Some(TransportErrorKind::TimedOut),
            _ => None,
        }
    }

    /// Failures below HTTP, as opposed to error statuses or bad bodies.
    pub fn is_connection_level(&self) -> bool {
        match self {
            DownloadFailure::Request { kind, .. } | DownloadFailure::Stream { kind, .. } => {
                kind.is_connection_level()
            }
            _ => false,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        DownloadFailure::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// GET `url` and stream the body to `dest`. Returns bytes written.
pub async fn fetch_to_file<F>(
    transport: &Transport,
    url: &str,
    dest: &Path,
    limits: &StreamLimits,
    on_progress: F,
) -> Result<u64, DownloadFailure>
where
    F: FnMut(u64, Option<u64>),
{
    let (response, handle) = transport
        .get(url)
        .await
        .map_err(|e| DownloadFailure::Request {
            kind: e.kind(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadFailure::Status(status.as_u16()));
    }

    let expected = response.content_length();
    let result = stream_to_file(response.bytes_stream(), dest, expected, limits, on_progress).await;

    if let Err(failure) = &result {
        if let Some(kind) = failure.proxy_kind() {
            transport.report(handle.as_ref(), Some(kind));
        }
    }
    result
}

/// Write `stream` to `dest` via its temp file.
pub async fn stream_to_file<S, B, F>(
    stream: S,
    dest: &Path,
    expected: Option<u64>,
    limits: &StreamLimits,
    on_progress: F,
) -> Result<u64, DownloadFailure>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
    F: FnMut(u64, Option<u64>),
{
    let temp = temp_path_for(dest);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadFailure::io(parent, e))?;
    }

    let transfer = write_stream(stream, &temp, expected, limits.stall_timeout, on_progress);
    let result = match tokio::time::timeout(limits.overall_timeout, transfer).await {
        Ok(result) => result,
        Err(_) => Err(DownloadFailure::OverallTimeout(limits.overall_timeout)),
    };

    let result = match result {
        Ok(written) => finalize(&temp, dest).await.map(|()| written),
        Err(e) => Err(e),
    };

    if result.is_err() {
        remove_if_exists(&temp).await;
    }
    result
}

async fn write_stream<S, B, F>(
    stream: S,
    temp: &Path,
    expected: Option<u64>,
    stall_timeout: Duration,
    mut on_progress: F,
) -> Result<u64, DownloadFailure>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
    F: FnMut(u64, Option<u64>),
{
    let mut stream = std::pin::pin!(stream);
    let mut file = tokio::fs::File::create(temp)
        .await
        .map_err(|e| DownloadFailure::io(temp, e))?;
    let mut written: u64 = 0;

    loop {
        let chunk = match tokio::time::timeout(stall_timeout, stream.next()).await {
            Err(_) => return Err(DownloadFailure::Stalled(stall_timeout)),
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                return Err(DownloadFailure::Stream {
                    kind: TransportErrorKind::classify(&e),
                    message: e.to_string(),
                })
            }
            Ok(Some(Ok(chunk))) => chunk,
        };
        let bytes = chunk.as_ref();
        file.write_all(bytes)
            .await
            .map_err(|e| DownloadFailure::io(temp, e))?;
        written += bytes.len() as u64;
        on_progress(written, expected);
    }

    file.flush().await.map_err(|e| DownloadFailure::io(temp, e))?;
    drop(file);

    if let Some(expected) = expected {
        if written != expected {
            return Err(DownloadFailure::SizeMismatch {
                expected,
                actual: written,
            });
        }
    }
    Ok(written)
}

/// Move the finished temp file into place, copying when rename can't
/// (e.g. across devices).
async fn finalize(temp: &Path, dest: &Path) -> Result<(), DownloadFailure> {
    match tokio::fs::rename(temp, dest).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                "Rename {} failed ({}), copying instead",
                temp.display(),
                rename_err
            );
            tokio::fs::copy(temp, dest)
                .await
                .map_err(|e| DownloadFailure::io(dest, e))?;
            remove_if_exists(temp).await;
            Ok(())
        }
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
