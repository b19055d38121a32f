use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use super::remote::{ByteStream, RemoteError};

/// 1 MiB write buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

pub const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("download cancelled")]
    Cancelled,
    #[error("download task ended without a result")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    Remote,
    Io,
    Cancelled,
    Aborted,
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferErrorKind::Remote => "remote",
            TransferErrorKind::Io => "io",
            TransferErrorKind::Cancelled => "cancelled",
            TransferErrorKind::Aborted => "aborted",
        })
    }
}

impl TransferError {
    pub fn kind(&self) -> TransferErrorKind {
        match self {
            TransferError::Remote(_) => TransferErrorKind::Remote,
            TransferError::Io(_) => TransferErrorKind::Io,
            TransferError::Cancelled => TransferErrorKind::Cancelled,
            TransferError::Aborted => TransferErrorKind::Aborted,
        }
    }
}

/// Streams remote content into place. Bytes go to `<target>.partial`
/// first; the target only appears once the whole body is on disk.
#[derive(Debug, Clone, Copy)]
pub struct Downloader {
    chunk_size: usize,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Downloader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Writes `stream` to `target`, returning the number of bytes written.
    /// On failure nothing is left at the partial path.
    pub async fn download(
        &self,
        stream: ByteStream,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let partial = partial_path(target);
        let written = match self.write_partial(stream, &partial, cancel).await {
            Ok(written) => written,
            Err(err) => {
                discard(&partial).await;
                return Err(err);
            }
        };
        if let Err(err) = tokio::fs::rename(&partial, target).await {
            discard(&partial).await;
            return Err(err.into());
        }
        Ok(written)
    }

    async fn write_partial(
        &self,
        mut stream: ByteStream,
        partial: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let file = tokio::fs::File::create(partial).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }
}

pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove partial download");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use tempfile::tempdir;

    fn chunks(parts: Vec<Result<&'static str, RemoteError>>) -> ByteStream {
        stream::iter(
            parts
                .into_iter()
                .map(|part| part.map(|text| Bytes::from_static(text.as_bytes()))),
        )
        .boxed()
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/m/clip.mp4")),
            PathBuf::from("/m/clip.mp4.partial")
        );
        assert_eq!(partial_path(Path::new("/m/notes")), PathBuf::from("/m/notes.partial"));
    }

    #[tokio::test]
    async fn writes_all_chunks_and_renames() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let downloader = Downloader::new(4);

        let written = downloader
            .download(
                chunks(vec![Ok("hel"), Ok("lo "), Ok("world")]),
                &target,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello world");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn overwrites_existing_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.bin");
        std::fs::write(&target, b"stale contents that are longer").unwrap();

        Downloader::default()
            .download(chunks(vec![Ok("new")]), &target, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }

    #[tokio::test]
    async fn mid_stream_error_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("broken.mp4");

        let err = Downloader::default()
            .download(
                chunks(vec![
                    Ok("partial body"),
                    Err(RemoteError::Stream("connection reset".into())),
                ]),
                &target,
                &CancellationToken::new(),
            )
            .await
            .expect_err("expected stream failure");

        assert_eq!(err.kind(), TransferErrorKind::Remote);
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn cancelled_download_is_cleaned_up() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("slow.mp4");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Downloader::default()
            .download(
                stream::pending::<Result<Bytes, RemoteError>>().boxed(),
                &target,
                &cancel,
            )
            .await
            .expect_err("expected cancellation");

        assert_eq!(err.kind(), TransferErrorKind::Cancelled);
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn missing_parent_directory_is_an_io_error() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("absent/out.bin");

        let err = Downloader::default()
            .download(chunks(vec![Ok("x")]), &target, &CancellationToken::new())
            .await
            .expect_err("expected io failure");

        assert_eq!(err.kind(), TransferErrorKind::Io);
    }
}
