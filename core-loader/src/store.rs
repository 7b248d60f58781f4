//! # Cache Store
//!
//! Per-resource persistent byte store.
//!
//! ## Overview
//!
//! Every [`ResourceIdentity`] owns three files in the cache directory:
//!
//! ```text
//! <key>.cache     bytes [0, write_cursor) of the resource, contiguous
//! <key>.complete  JSON completion marker, present only for a finished file
//! <key>.probe     scratch spool of the current probe download, never reused
//! ```
//!
//! The data file only ever grows at its write cursor, so it never holds a hole.
//! A data file without a valid marker is a leftover from an interrupted run and
//! is discarded when the resource is opened; a marker whose recorded length does
//! not match the data file is discarded along with the data.
//!
//! All file access goes through the host's [`FileSystemAccess`] bridge. The
//! store is shared between the coordinator (reads) and the active download
//! (writes) as a [`SharedStore`], an async mutex held across that I/O.

use crate::error::{LoaderError, Result};
use crate::identity::ResourceIdentity;
use bridge_traits::storage::{FileSystemAccess, OpenMode, RandomAccessFile};
use bridge_traits::BridgeError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Store shared between the coordinator and the active download.
pub type SharedStore = Arc<Mutex<CacheStore>>;

/// Contents of `<key>.complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub url: String,
    pub total_length: u64,
    pub content_type: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Snapshot of one cache file's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    /// Bytes written contiguously from offset 0
    pub write_cursor: u64,
    /// Resource size, once known
    pub total_length: Option<u64>,
    pub content_type: Option<String>,
    pub is_complete: bool,
    /// Bytes held by the probe spool
    pub probe_length: u64,
}

/// What [`CacheStore::open`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Nothing usable on disk; the file will be created on first write.
    Fresh,
    /// A complete file from an earlier run; no network access is needed.
    Reused { total_length: u64 },
    /// Leftover files were thrown away.
    Discarded { reason: String },
    /// The identity was already open in this store.
    AlreadyOpen,
}

struct CacheFile {
    data_path: PathBuf,
    marker_path: PathBuf,
    probe_path: PathBuf,
    write_cursor: u64,
    total_length: Option<u64>,
    content_type: Option<String>,
    complete: bool,
    data: Option<Box<dyn RandomAccessFile>>,
    probe: Option<Box<dyn RandomAccessFile>>,
    probe_length: u64,
}

impl CacheFile {
    fn new(root: &Path, identity: &ResourceIdentity) -> Self {
        Self {
            data_path: root.join(identity.data_file_name()),
            marker_path: root.join(identity.marker_file_name()),
            probe_path: root.join(identity.probe_file_name()),
            write_cursor: 0,
            total_length: None,
            content_type: None,
            complete: false,
            data: None,
            probe: None,
            probe_length: 0,
        }
    }

    fn info(&self) -> CacheInfo {
        CacheInfo {
            write_cursor: self.write_cursor,
            total_length: self.total_length,
            content_type: self.content_type.clone(),
            is_complete: self.complete,
            probe_length: self.probe_length,
        }
    }

    async fn data_handle(
        &mut self,
        fs: &dyn FileSystemAccess,
    ) -> Result<&mut Box<dyn RandomAccessFile>> {
        if self.data.is_none() {
            let mode = if self.complete {
                OpenMode::Read
            } else {
                OpenMode::ReadWrite
            };
            let handle = fs
                .open_file(&self.data_path, mode)
                .await
                .map_err(storage_error)?;
            self.data = Some(handle);
        }
        self.data
            .as_mut()
            .ok_or_else(|| LoaderError::Internal("data file unavailable".to_string()))
    }

    async fn probe_handle(
        &mut self,
        fs: &dyn FileSystemAccess,
    ) -> Result<&mut Box<dyn RandomAccessFile>> {
        if self.probe.is_none() {
            let handle = fs
                .open_file(&self.probe_path, OpenMode::Truncate)
                .await
                .map_err(storage_error)?;
            self.probe = Some(handle);
        }
        self.probe
            .as_mut()
            .ok_or_else(|| LoaderError::Internal("probe file unavailable".to_string()))
    }
}

/// Explicit mapping from resource key to cache file state.
pub struct CacheStore {
    root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    files: HashMap<String, CacheFile>,
}

impl CacheStore {
    /// Create a store rooted at `root`. Nothing touches the disk until [`open`](Self::open).
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            root: root.into(),
            fs,
            files: HashMap::new(),
        }
    }

    /// Wrap the store for sharing with download tasks.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open the cache file for `identity`.
    ///
    /// Idempotent: a second call returns [`OpenOutcome::AlreadyOpen`] and keeps
    /// the in-memory state.
    #[instrument(skip(self), fields(resource = identity.short_key()))]
    pub async fn open(&mut self, identity: &ResourceIdentity) -> Result<OpenOutcome> {
        if self.files.contains_key(identity.key()) {
            return Ok(OpenOutcome::AlreadyOpen);
        }

        let fs = self.fs.as_ref();
        fs.create_dir_all(&self.root).await.map_err(storage_error)?;
        let mut file = CacheFile::new(&self.root, identity);

        // Probe spools never outlive the run that wrote them
        fs.remove_file(&file.probe_path).await.map_err(storage_error)?;

        let outcome = match inspect(fs, &file, identity).await? {
            Inspection::Missing => OpenOutcome::Fresh,
            Inspection::Complete(marker) => {
                file.write_cursor = marker.total_length;
                file.total_length = Some(marker.total_length);
                file.content_type = marker.content_type;
                file.complete = true;
                info!(
                    total_length = marker.total_length,
                    "Reusing complete cache file"
                );
                OpenOutcome::Reused {
                    total_length: marker.total_length,
                }
            }
            Inspection::Unusable(reason) => {
                let name = file.data_path.to_string_lossy().into_owned();
                warn!(file = strip_path(&name), %reason, "Discarding cache file");
                fs.remove_file(&file.data_path).await.map_err(storage_error)?;
                fs.remove_file(&file.marker_path).await.map_err(storage_error)?;
                OpenOutcome::Discarded { reason }
            }
        };

        self.files.insert(identity.key().to_string(), file);
        Ok(outcome)
    }

    /// Current bookkeeping of an open cache file.
    pub fn info(&self, identity: &ResourceIdentity) -> Option<CacheInfo> {
        self.files.get(identity.key()).map(CacheFile::info)
    }

    /// Append `bytes` at the write cursor. Returns the new write cursor.
    pub async fn append(&mut self, identity: &ResourceIdentity, bytes: &[u8]) -> Result<u64> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        if file.complete {
            return Err(LoaderError::Internal(
                "complete cache file is read-only until reset".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Ok(file.write_cursor);
        }

        let cursor = file.write_cursor;
        file.data_handle(fs.as_ref())
            .await?
            .write_at(cursor, bytes)
            .await
            .map_err(storage_error)?;

        file.write_cursor = cursor + bytes.len() as u64;
        Ok(file.write_cursor)
    }

    /// Read exactly `length` bytes at `offset`; the range must lie below the write cursor.
    pub async fn read(
        &mut self,
        identity: &ResourceIdentity,
        offset: u64,
        length: usize,
    ) -> Result<Bytes> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        let end = offset.saturating_add(length as u64);
        if end > file.write_cursor {
            return Err(LoaderError::Internal(format!(
                "read [{}, {}) beyond write cursor {}",
                offset, end, file.write_cursor
            )));
        }
        if length == 0 {
            return Ok(Bytes::new());
        }

        let path = file.data_path.clone();
        file.data_handle(fs.as_ref())
            .await?
            .read_at(offset, length)
            .await
            .map_err(|e| read_error(e, &path, end))
    }

    /// Truncate the data file and drop the completion marker.
    pub async fn reset(&mut self, identity: &ResourceIdentity) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        file.data = None;
        fs.remove_file(&file.marker_path).await.map_err(storage_error)?;
        fs.remove_file(&file.data_path).await.map_err(storage_error)?;
        file.write_cursor = 0;
        file.complete = false;
        debug!(resource = identity.short_key(), "Cache file reset");
        Ok(())
    }

    /// Record the resource size declared by the server.
    pub fn set_total_length(&mut self, identity: &ResourceIdentity, total: u64) -> Result<()> {
        let file = self.file_mut(identity)?;
        if file.write_cursor > total {
            return Err(LoaderError::CorruptCache(format!(
                "{} cached bytes exceed the declared length {}",
                file.write_cursor, total
            )));
        }
        file.total_length = Some(total);
        Ok(())
    }

    pub fn set_content_type(
        &mut self,
        identity: &ResourceIdentity,
        content_type: Option<String>,
    ) -> Result<()> {
        let file = self.file_mut(identity)?;
        if content_type.is_some() {
            file.content_type = content_type;
        }
        Ok(())
    }

    /// Promote a fully written file to complete and persist its marker.
    #[instrument(skip(self), fields(resource = identity.short_key()))]
    pub async fn mark_complete(&mut self, identity: &ResourceIdentity) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        if file.complete {
            return Ok(());
        }

        let total_length = match file.total_length {
            Some(total) if total == file.write_cursor => total,
            other => {
                return Err(LoaderError::Internal(format!(
                    "cannot mark complete: {} of {:?} bytes written",
                    file.write_cursor, other
                )))
            }
        };

        // An empty resource still gets a data file
        file.data_handle(fs.as_ref())
            .await?
            .sync_data()
            .await
            .map_err(storage_error)?;

        let marker = CompletionMarker {
            url: identity.url().to_string(),
            total_length,
            content_type: file.content_type.clone(),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&marker)
            .map_err(|e| LoaderError::Internal(format!("Failed to encode marker: {}", e)))?;

        let tmp_path = file.marker_path.with_extension("complete.tmp");
        fs.write_file(&tmp_path, Bytes::from(json))
            .await
            .map_err(storage_error)?;
        fs.rename(&tmp_path, &file.marker_path)
            .await
            .map_err(storage_error)?;

        file.complete = true;
        file.data = None;
        info!(total_length, "Cache file marked complete");
        Ok(())
    }

    /// Path of the finished data file for `url`, if a valid marker confirms it.
    ///
    /// Lets a host play a finished cache directly without spawning a loader.
    pub async fn completed_path(&self, url: &str) -> Option<PathBuf> {
        let identity = ResourceIdentity::from_url(url).ok()?;
        if let Some(file) = self.files.get(identity.key()) {
            return file.complete.then(|| file.data_path.clone());
        }

        let file = CacheFile::new(&self.root, &identity);
        match inspect(self.fs.as_ref(), &file, &identity).await {
            Ok(Inspection::Complete(_)) => Some(file.data_path),
            _ => None,
        }
    }

    // ========================================================================
    // Probe spool
    // ========================================================================

    /// Empty the probe spool ahead of a new probe download.
    pub async fn reset_probe(&mut self, identity: &ResourceIdentity) -> Result<()> {
        let file = self.file_mut(identity)?;
        if let Some(handle) = file.probe.as_mut() {
            handle.set_len(0).await.map_err(storage_error)?;
        }
        file.probe_length = 0;
        Ok(())
    }

    /// Append bytes of the probe download. Returns the spool length.
    pub async fn append_probe(
        &mut self,
        identity: &ResourceIdentity,
        bytes: &[u8],
    ) -> Result<u64> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        let cursor = file.probe_length;
        file.probe_handle(fs.as_ref())
            .await?
            .write_at(cursor, bytes)
            .await
            .map_err(storage_error)?;
        file.probe_length = cursor + bytes.len() as u64;
        Ok(file.probe_length)
    }

    /// Read `length` bytes at `offset` relative to the probe download's start.
    pub async fn read_probe(
        &mut self,
        identity: &ResourceIdentity,
        offset: u64,
        length: usize,
    ) -> Result<Bytes> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        let end = offset.saturating_add(length as u64);
        if end > file.probe_length {
            return Err(LoaderError::Internal(format!(
                "probe read [{}, {}) beyond spool length {}",
                offset, end, file.probe_length
            )));
        }
        if length == 0 {
            return Ok(Bytes::new());
        }

        let path = file.probe_path.clone();
        file.probe_handle(fs.as_ref())
            .await?
            .read_at(offset, length)
            .await
            .map_err(|e| read_error(e, &path, end))
    }

    /// Delete the probe spool.
    pub async fn discard_probe(&mut self, identity: &ResourceIdentity) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let file = self.file_mut(identity)?;
        file.probe = None;
        file.probe_length = 0;
        fs.remove_file(&file.probe_path).await.map_err(storage_error)
    }

    fn file_mut(&mut self, identity: &ResourceIdentity) -> Result<&mut CacheFile> {
        self.files.get_mut(identity.key()).ok_or_else(|| {
            LoaderError::Internal(format!("cache file {} is not open", identity.short_key()))
        })
    }
}

enum Inspection {
    Missing,
    Complete(CompletionMarker),
    Unusable(String),
}

async fn inspect(
    fs: &dyn FileSystemAccess,
    file: &CacheFile,
    identity: &ResourceIdentity,
) -> Result<Inspection> {
    let data_len = fs.file_size(&file.data_path).await.map_err(storage_error)?;
    let marker = fs
        .read_file(&file.marker_path)
        .await
        .map_err(storage_error)?
        .map(|raw| serde_json::from_slice::<CompletionMarker>(&raw));

    Ok(match (data_len, marker) {
        (None, None) => Inspection::Missing,
        (Some(_), None) => Inspection::Unusable("partial cache from an earlier run".to_string()),
        (_, Some(Err(e))) => Inspection::Unusable(format!("unreadable completion marker: {}", e)),
        (None, Some(Ok(_))) => Inspection::Unusable("completion marker without data".to_string()),
        (Some(_), Some(Ok(marker))) if marker.url != identity.url() => {
            Inspection::Unusable("completion marker belongs to another resource".to_string())
        }
        (Some(len), Some(Ok(marker))) if len != marker.total_length => Inspection::Unusable(
            format!("data file holds {} of {} bytes", len, marker.total_length),
        ),
        (Some(_), Some(Ok(marker))) => Inspection::Complete(marker),
    })
}

/// Cache file primitives only fail with I/O errors; anything else is a bridge bug.
fn storage_error(err: BridgeError) -> LoaderError {
    match err {
        BridgeError::Io(e) => LoaderError::Io(Arc::new(e)),
        other => LoaderError::Internal(format!("file system bridge: {}", other)),
    }
}

fn read_error(err: BridgeError, path: &Path, end: u64) -> LoaderError {
    match err {
        BridgeError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            LoaderError::CorruptCache(format!("{} ends before byte {}", path.display(), end))
        }
        other => storage_error(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use std::fs;
    use tempfile::TempDir;

    const URL: &str = "https://cdn.example.com/clip.mp4";

    fn new_store(dir: &TempDir) -> CacheStore {
        CacheStore::new(dir.path(), Arc::new(TokioFileSystem::new()))
    }

    fn setup() -> (TempDir, CacheStore, ResourceIdentity) {
        let dir = TempDir::new().unwrap();
        let store = new_store(&dir);
        let identity = ResourceIdentity::from_url(URL).unwrap();
        (dir, store, identity)
    }

    async fn finished_store(dir: &TempDir, identity: &ResourceIdentity, body: &[u8]) {
        let mut store = new_store(dir);
        store.open(identity).await.unwrap();
        store.set_total_length(identity, body.len() as u64).unwrap();
        store
            .set_content_type(identity, Some("video/mp4".to_string()))
            .unwrap();
        store.append(identity, body).await.unwrap();
        store.mark_complete(identity).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_fresh_is_idempotent() {
        let (_dir, mut store, identity) = setup();
        assert_eq!(store.open(&identity).await.unwrap(), OpenOutcome::Fresh);
        assert_eq!(store.open(&identity).await.unwrap(), OpenOutcome::AlreadyOpen);

        let info = store.info(&identity).unwrap();
        assert_eq!(info.write_cursor, 0);
        assert_eq!(info.total_length, None);
        assert!(!info.is_complete);
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let (_dir, mut store, identity) = setup();
        store.open(&identity).await.unwrap();

        assert_eq!(store.append(&identity, b"hello ").await.unwrap(), 6);
        assert_eq!(store.append(&identity, b"world").await.unwrap(), 11);

        assert_eq!(&store.read(&identity, 0, 5).await.unwrap()[..], b"hello");
        assert_eq!(&store.read(&identity, 6, 5).await.unwrap()[..], b"world");
        assert!(store.read(&identity, 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_past_write_cursor_is_rejected() {
        let (_dir, mut store, identity) = setup();
        store.open(&identity).await.unwrap();
        store.append(&identity, b"abc").await.unwrap();

        let err = store.read(&identity, 2, 2).await.unwrap_err();
        assert!(matches!(err, LoaderError::Internal(_)));
    }

    #[tokio::test]
    async fn test_operations_on_unopened_identity_fail() {
        let (_dir, mut store, identity) = setup();
        assert!(store.append(&identity, b"x").await.is_err());
        assert!(store.info(&identity).is_none());
    }

    #[tokio::test]
    async fn test_mark_complete_writes_marker_and_reopen_reuses() {
        let (dir, _store, identity) = setup();
        finished_store(&dir, &identity, b"0123456789").await;

        let marker_path = dir.path().join(identity.marker_file_name());
        let marker: CompletionMarker =
            serde_json::from_slice(&fs::read(&marker_path).unwrap()).unwrap();
        assert_eq!(marker.total_length, 10);
        assert_eq!(marker.url, URL);
        assert_eq!(marker.content_type.as_deref(), Some("video/mp4"));

        let mut reopened = new_store(&dir);
        assert_eq!(
            reopened.open(&identity).await.unwrap(),
            OpenOutcome::Reused { total_length: 10 }
        );
        let info = reopened.info(&identity).unwrap();
        assert!(info.is_complete);
        assert_eq!(info.write_cursor, 10);
        assert_eq!(info.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(&reopened.read(&identity, 3, 4).await.unwrap()[..], b"3456");
    }

    #[tokio::test]
    async fn test_complete_file_rejects_append_until_reset() {
        let (dir, _store, identity) = setup();
        finished_store(&dir, &identity, b"abc").await;

        let mut store = new_store(&dir);
        store.open(&identity).await.unwrap();
        assert!(store.append(&identity, b"d").await.is_err());

        store.reset(&identity).await.unwrap();
        assert!(!dir.path().join(identity.marker_file_name()).exists());
        assert_eq!(store.append(&identity, b"xyz").await.unwrap(), 3);
        assert_eq!(&store.read(&identity, 0, 3).await.unwrap()[..], b"xyz");
    }

    #[tokio::test]
    async fn test_mark_complete_requires_full_length() {
        let (_dir, mut store, identity) = setup();
        store.open(&identity).await.unwrap();
        store.append(&identity, b"abc").await.unwrap();

        assert!(store.mark_complete(&identity).await.is_err());
        store.set_total_length(&identity, 4).unwrap();
        assert!(store.mark_complete(&identity).await.is_err());
        store.append(&identity, b"d").await.unwrap();
        store.mark_complete(&identity).await.unwrap();
        assert!(store.info(&identity).unwrap().is_complete);
    }

    #[tokio::test]
    async fn test_partial_file_without_marker_is_discarded() {
        let (dir, _store, identity) = setup();
        {
            let mut store = new_store(&dir);
            store.open(&identity).await.unwrap();
            store.append(&identity, b"partial").await.unwrap();
        }
        assert!(dir.path().join(identity.data_file_name()).exists());

        let mut store = new_store(&dir);
        let outcome = store.open(&identity).await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Discarded { .. }));
        assert!(!dir.path().join(identity.data_file_name()).exists());
        assert_eq!(store.info(&identity).unwrap().write_cursor, 0);
    }

    #[tokio::test]
    async fn test_corrupt_marker_is_discarded() {
        let (dir, _store, identity) = setup();
        finished_store(&dir, &identity, b"abcdef").await;
        fs::write(dir.path().join(identity.marker_file_name()), b"{not json").unwrap();

        let mut store = new_store(&dir);
        let outcome = store.open(&identity).await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Discarded { .. }));
        assert!(!dir.path().join(identity.marker_file_name()).exists());
        assert!(!dir.path().join(identity.data_file_name()).exists());
    }

    #[tokio::test]
    async fn test_truncated_data_with_marker_is_discarded() {
        let (dir, _store, identity) = setup();
        finished_store(&dir, &identity, b"abcdef").await;
        fs::write(dir.path().join(identity.data_file_name()), b"abc").unwrap();

        let mut store = new_store(&dir);
        match store.open(&identity).await.unwrap() {
            OpenOutcome::Discarded { reason } => assert!(reason.contains("3 of 6")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_data_truncated_after_open_reads_as_corrupt() {
        let (dir, _store, identity) = setup();
        finished_store(&dir, &identity, b"abcdef").await;

        let mut store = new_store(&dir);
        store.open(&identity).await.unwrap();
        fs::write(dir.path().join(identity.data_file_name()), b"ab").unwrap();

        let err = store.read(&identity, 0, 6).await.unwrap_err();
        assert!(matches!(err, LoaderError::CorruptCache(_)));
        assert!(err.is_io_error());
    }

    #[tokio::test]
    async fn test_completed_path() {
        let (dir, store, identity) = setup();
        assert_eq!(store.completed_path(URL).await, None);

        finished_store(&dir, &identity, b"abc").await;
        assert_eq!(
            store.completed_path(URL).await,
            Some(dir.path().join(identity.data_file_name()))
        );
        assert_eq!(
            store
                .completed_path("streaming+https://CDN.example.com/clip.mp4")
                .await,
            Some(dir.path().join(identity.data_file_name()))
        );
        assert_eq!(store.completed_path("not a url").await, None);
    }

    #[tokio::test]
    async fn test_declared_length_shorter_than_cache_is_corrupt() {
        let (_dir, mut store, identity) = setup();
        store.open(&identity).await.unwrap();
        store.append(&identity, b"abcdef").await.unwrap();

        let err = store.set_total_length(&identity, 4).unwrap_err();
        assert!(matches!(err, LoaderError::CorruptCache(_)));
    }

    #[tokio::test]
    async fn test_probe_spool() {
        let (dir, mut store, identity) = setup();
        store.open(&identity).await.unwrap();

        store.append_probe(&identity, b"probe-").await.unwrap();
        assert_eq!(store.append_probe(&identity, b"bytes").await.unwrap(), 11);
        assert_eq!(&store.read_probe(&identity, 6, 5).await.unwrap()[..], b"bytes");
        assert!(store.read_probe(&identity, 8, 5).await.is_err());
        assert_eq!(store.info(&identity).unwrap().write_cursor, 0);

        store.reset_probe(&identity).await.unwrap();
        assert_eq!(store.info(&identity).unwrap().probe_length, 0);
        store.append_probe(&identity, b"next").await.unwrap();
        assert_eq!(&store.read_probe(&identity, 0, 4).await.unwrap()[..], b"next");

        store.discard_probe(&identity).await.unwrap();
        assert!(!dir.path().join(identity.probe_file_name()).exists());
    }

    #[tokio::test]
    async fn test_stale_probe_is_removed_on_open() {
        let (dir, mut store, identity) = setup();
        fs::write(dir.path().join(identity.probe_file_name()), b"stale").unwrap();

        assert_eq!(store.open(&identity).await.unwrap(), OpenOutcome::Fresh);
        assert!(!dir.path().join(identity.probe_file_name()).exists());
    }
}
