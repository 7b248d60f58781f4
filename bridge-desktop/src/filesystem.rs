//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileSystemAccess, OpenMode, RandomAccessFile},
};
use bytes::Bytes;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// Directory name created under the platform cache directory.
pub const CACHE_SUBDIRECTORY: &str = "rangecache";

/// Platform cache directory for media cache files.
///
/// Falls back to the system temp directory when the platform does not expose one.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_SUBDIRECTORY)
}

/// Tokio-based file system implementation
///
/// All operations run on `tokio::fs`, so cache I/O never blocks a runtime
/// worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Bytes>> {
        match fs::read(path).await {
            Ok(data) => {
                debug!(path = ?path, size = data.len(), "Read file");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = ?path, "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn open_file(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn RandomAccessFile>> {
        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::ReadWrite => options.read(true).write(true).create(true).truncate(false),
            OpenMode::Truncate => options.read(true).write(true).create(true).truncate(true),
        };

        let file = options.open(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, ?mode, "Opened file");
        Ok(Box::new(TokioFile { file }))
    }
}

/// Offset-addressed handle over a `tokio::fs::File`.
struct TokioFile {
    file: fs::File,
}

#[async_trait]
impl RandomAccessFile for TokioFile {
    async fn read_at(&mut self, offset: u64, length: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; length];
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        // tokio buffers the last write; settle it before the next seek or read
        self.file.flush().await?;
        Ok(())
    }

    async fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len).await?;
        Ok(())
    }

    async fn sync_data(&mut self) -> Result<()> {
        self.file.sync_data().await?;
        Ok(())
    }
}
