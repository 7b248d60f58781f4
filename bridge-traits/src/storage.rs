//! Storage Abstractions
//!
//! Platform-agnostic file primitives for the range cache. The cache addresses
//! its files by absolute byte offset, so besides whole-file helpers the trait
//! hands out open [`RandomAccessFile`] handles.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::Result;

/// How [`FileSystemAccess::open_file`] opens a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, read only.
    Read,
    /// Read and write; created if missing, existing contents kept.
    ReadWrite,
    /// Read and write; created if missing, truncated to zero length.
    Truncate,
}

/// Open file addressed by absolute byte offsets.
#[async_trait]
pub trait RandomAccessFile: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Fails with an [`std::io::ErrorKind::UnexpectedEof`] I/O error when the
    /// file ends first.
    async fn read_at(&mut self, offset: u64, length: usize) -> Result<Bytes>;

    /// Write all of `data` starting at `offset`, extending the file as needed.
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Truncate or extend the file to `len` bytes.
    async fn set_len(&mut self, len: u64) -> Result<()>;

    /// Flush written data to the storage device.
    async fn sync_data(&mut self) -> Result<()>;
}

/// File system access trait
///
/// Abstracts file I/O so the cache core never touches the platform file
/// system directly:
/// - Desktop: `tokio::fs`
/// - Mobile: sandboxed app cache directories
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{FileSystemAccess, OpenMode};
///
/// async fn first_bytes(fs: &dyn FileSystemAccess, path: &Path) -> Result<Bytes> {
///     let mut file = fs.open_file(path, OpenMode::Read).await?;
///     file.read_at(0, 16).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Size of the file at `path`, or `None` if it does not exist
    async fn file_size(&self, path: &Path) -> Result<Option<u64>>;

    /// Read entire file contents, or `None` if it does not exist
    async fn read_file(&self, path: &Path) -> Result<Option<Bytes>>;

    /// Write data to a file, replacing any previous contents
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Atomically replace `to` with `from`
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file. A missing file is not an error.
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Open a file for offset-addressed access
    async fn open_file(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn RandomAccessFile>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;
    use std::path::PathBuf;

    mock! {
        Fs {}

        #[async_trait]
        impl FileSystemAccess for Fs {
            async fn create_dir_all(&self, path: &Path) -> Result<()>;
            async fn file_size(&self, path: &Path) -> Result<Option<u64>>;
            async fn read_file(&self, path: &Path) -> Result<Option<Bytes>>;
            async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;
            async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
            async fn remove_file(&self, path: &Path) -> Result<()>;
            async fn open_file(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn RandomAccessFile>>;
        }
    }

    struct MemoryFile(Vec<u8>);

    #[async_trait]
    impl RandomAccessFile for MemoryFile {
        async fn read_at(&mut self, offset: u64, length: usize) -> Result<Bytes> {
            let start = offset as usize;
            match self.0.get(start..start + length) {
                Some(slice) => Ok(Bytes::copy_from_slice(slice)),
                None => Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "short file",
                ))),
            }
        }

        async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
            let start = offset as usize;
            if self.0.len() < start + data.len() {
                self.0.resize(start + data.len(), 0);
            }
            self.0[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        async fn set_len(&mut self, len: u64) -> Result<()> {
            self.0.resize(len as usize, 0);
            Ok(())
        }

        async fn sync_data(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mock_file_system_hands_out_handles() {
        let mut fs = MockFs::new();
        fs.expect_open_file()
            .withf(|path, mode| path == Path::new("/cache/a.cache") && *mode == OpenMode::ReadWrite)
            .times(1)
            .returning(|_, _| Ok(Box::new(MemoryFile(Vec::new()))));
        fs.expect_file_size().returning(|_| Ok(None));

        let path = PathBuf::from("/cache/a.cache");
        assert_eq!(fs.file_size(&path).await.unwrap(), None);

        let mut file = fs.open_file(&path, OpenMode::ReadWrite).await.unwrap();
        file.write_at(0, b"hello").await.unwrap();
        file.write_at(5, b" world").await.unwrap();
        assert_eq!(&file.read_at(6, 5).await.unwrap()[..], b"world");

        let err = file.read_at(8, 10).await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }
}
