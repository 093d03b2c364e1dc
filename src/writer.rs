//! Atomic file writer
//!
//! Bodies are streamed into `<name>.part` next to the destination and renamed into
//! place only after the whole body is on disk. A destination path either does not
//! exist or holds a complete file.

use crate::error::{Result, TransportError, WriteError};
use crate::types::Destination;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Default copy buffer size
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Streams a response body to its destination through a `.part` file
#[derive(Clone, Copy, Debug)]
pub struct AtomicWriter {
    chunk_size: usize,
}

impl Default for AtomicWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl AtomicWriter {
    /// Create a writer copying `chunk_size` bytes at a time
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Copy `body` to `destination`, publishing it only on success
    ///
    /// Returns the number of bytes written. When `expected_len` is set, a body of any
    /// other length is rejected. An existing `.part` file is never opened or truncated.
    /// Once the `.part` file is created, every error path removes it and nothing
    /// appears at the final path. A body read error is reported as
    /// [`TransportError::Body`]; filesystem errors as [`WriteError`].
    pub async fn write<R>(
        &self,
        body: &mut R,
        destination: &Destination,
        expected_len: Option<u64>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let final_path = destination.path();
        let (mut part, mut file) = PartFile::create(destination.part_path()).await?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;
        loop {
            let n = body.read(&mut buffer).await.map_err(TransportError::Body)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .await
                .map_err(|source| part.write_error(source))?;
            written += n as u64;
        }

        if let Some(expected) = expected_len
            && expected != written
        {
            return Err(WriteError::LengthMismatch {
                expected,
                received: written,
            }
            .into());
        }

        file.flush().await.map_err(|source| part.write_error(source))?;
        file.sync_all()
            .await
            .map_err(|source| part.write_error(source))?;
        drop(file);

        part.publish(&final_path).await?;

        tracing::debug!(path = %final_path.display(), bytes = written, "Published file");
        Ok(written)
    }
}

/// Owns a `.part` path and removes it on drop unless it was published
struct PartFile {
    path: PathBuf,
    published: bool,
}

impl PartFile {
    // Never opens an existing file; whatever is already at `path` is left alone
    async fn create(path: PathBuf) -> std::result::Result<(Self, File), WriteError> {
        let opened = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match opened {
            Ok(file) => Ok((
                Self {
                    path,
                    published: false,
                },
                file,
            )),
            Err(source) => Err(WriteError::Create { path, source }),
        }
    }

    fn write_error(&self, source: std::io::Error) -> WriteError {
        WriteError::Write {
            path: self.path.clone(),
            source,
        }
    }

    async fn publish(&mut self, to: &Path) -> std::result::Result<(), WriteError> {
        tokio::fs::rename(&self.path, to)
            .await
            .map_err(|source| WriteError::Publish {
                from: self.path.clone(),
                to: to.to_path_buf(),
                source,
            })?;
        self.published = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove partial file");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::StreamExt;
    use std::io;
    use std::time::Duration;
    use tokio_util::io::StreamReader;

    fn destination(dir: &Path, name: &str) -> Destination {
        Destination {
            directory: dir.to_path_buf(),
            filename: name.to_string(),
        }
    }

    fn leftover_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn writes_body_across_many_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "big.pdf");
        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

        let written = AtomicWriter::default()
            .write(&mut content.as_slice(), &dest, Some(content.len() as u64))
            .await
            .unwrap();

        assert_eq!(written, content.len() as u64);
        assert_eq!(std::fs::read(dest.path()).unwrap(), content);
        assert_eq!(leftover_files(dir.path()), vec!["big.pdf".to_string()]);
    }

    #[tokio::test]
    async fn empty_body_publishes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "empty.pdf");

        let written = AtomicWriter::new(16)
            .write(&mut &b""[..], &dest, None)
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(std::fs::metadata(dest.path()).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn existing_part_file_is_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "doc.pdf");
        std::fs::write(dest.part_path(), b"someone else's file").unwrap();

        let err = AtomicWriter::default()
            .write(&mut &b"fresh"[..], &dest, Some(5))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Write(WriteError::Create { .. })));
        assert_eq!(
            std::fs::read(dest.part_path()).unwrap(),
            b"someone else's file"
        );
        assert!(!dest.path().exists());
    }

    #[tokio::test]
    async fn body_error_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "broken.pdf");
        let chunks = futures::stream::iter(vec![
            Ok::<&'static [u8], io::Error>(b"partial"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        ]);
        let mut body = StreamReader::new(chunks);

        let err = AtomicWriter::default()
            .write(&mut body, &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Body(_))));
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn length_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "short.pdf");

        let err = AtomicWriter::default()
            .write(&mut &b"four"[..], &dest, Some(10))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Write(WriteError::LengthMismatch {
                expected: 10,
                received: 4
            })
        ));
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn missing_directory_fails_at_create() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(&dir.path().join("absent"), "a.pdf");

        let err = AtomicWriter::default()
            .write(&mut &b"data"[..], &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Write(WriteError::Create { .. })));
    }

    #[tokio::test]
    async fn failed_publish_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "taken");
        // A non-empty directory at the final path makes the rename fail
        std::fs::create_dir(dest.path()).unwrap();
        std::fs::write(dest.path().join("inner"), b"x").unwrap();

        let err = AtomicWriter::default()
            .write(&mut &b"data"[..], &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Write(WriteError::Publish { .. })));
        assert!(!dest.part_path().exists());
    }

    #[tokio::test]
    async fn cancelled_write_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = destination(dir.path(), "stalled.pdf");
        let chunks = futures::stream::iter(vec![Ok::<&'static [u8], io::Error>(b"abc")])
            .chain(futures::stream::pending());
        let mut body = StreamReader::new(chunks);

        let writer = AtomicWriter::default();
        let result =
            tokio::time::timeout(Duration::from_millis(50), writer.write(&mut body, &dest, None))
                .await;

        assert!(result.is_err());
        assert!(leftover_files(dir.path()).is_empty());
    }
}
