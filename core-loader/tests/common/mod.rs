//! Shared fixtures for loader integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{RangeFetcher, RangeRequest, RangeResponse};
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_loader::{LoaderConfig, LoaderError, LoaderResponse, RequestId};
use futures::stream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

pub const URL: &str = "https://media.example.com/videos/sample.mp4";

const TIMEOUT: Duration = Duration::from_secs(5);

/// Deterministic resource body of `len` bytes.
pub fn resource(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>().into()
}

pub fn config(dir: &Path) -> LoaderConfig {
    LoaderConfig::new().with_cache_directory(dir)
}

pub fn fs() -> Arc<dyn FileSystemAccess> {
    Arc::new(TokioFileSystem::new())
}

// ============================================================================
// Scripted transport
// ============================================================================

/// One-shot failure applied to the next fetch.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// The fetch itself fails.
    Refuse,
    /// The body breaks once it reaches this absolute offset.
    ResetAt(u64),
}

/// In-memory transport serving one resource.
///
/// Bodies only yield bytes below the release mark, so a test decides how far
/// a download has progressed. [`ScriptedFetcher::new`] releases everything.
pub struct ScriptedFetcher {
    resource: Bytes,
    chunk_size: usize,
    content_type: Option<String>,
    declare_length: bool,
    release: watch::Sender<u64>,
    calls: Mutex<Vec<u64>>,
    failures: Mutex<VecDeque<Failure>>,
    open_streams: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new(resource: Bytes) -> Self {
        Self::with_release(resource, u64::MAX)
    }

    /// Nothing is released until [`release_to`](Self::release_to).
    pub fn manual(resource: Bytes) -> Self {
        Self::with_release(resource, 0)
    }

    fn with_release(resource: Bytes, release: u64) -> Self {
        let (release, _) = watch::channel(release);
        Self {
            resource,
            chunk_size: 100,
            content_type: Some("video/mp4".to_string()),
            declare_length: true,
            release,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(str::to_string);
        self
    }

    /// Do not declare the total length; the end is known at end of stream.
    pub fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    pub fn fail_next(&self, failure: Failure) {
        self.failures.lock().push_back(failure);
    }

    /// Let every body yield bytes below absolute offset `offset`.
    pub fn release_to(&self, offset: u64) {
        self.release.send_replace(offset);
    }

    /// Offsets of every fetch so far.
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().clone()
    }

    /// Bodies handed out and not dropped yet.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeFetcher for ScriptedFetcher {
    async fn fetch(&self, request: RangeRequest) -> BridgeResult<RangeResponse> {
        self.calls.lock().push(request.offset);

        let failure = self.failures.lock().pop_front();
        if let Some(Failure::Refuse) = failure {
            return Err(BridgeError::OperationFailed("connection refused".to_string()));
        }

        let total = self.resource.len() as u64;
        if request.offset >= total {
            return Err(BridgeError::RangeNotSatisfiable {
                offset: request.offset,
            });
        }

        let state = Body {
            resource: self.resource.clone(),
            position: request.offset,
            chunk_size: self.chunk_size as u64,
            release: self.release.subscribe(),
            reset_at: match failure {
                Some(Failure::ResetAt(at)) => Some(at),
                _ => None,
            },
            broken: false,
            _guard: StreamGuard::new(Arc::clone(&self.open_streams)),
        };
        let body = stream::unfold(state, |mut state| async move {
            state.next_chunk().await.map(|item| (item, state))
        });

        Ok(RangeResponse::new(206, Box::pin(body))
            .with_total_length(self.declare_length.then_some(total))
            .with_content_type(self.content_type.clone())
            .with_accepts_ranges(true))
    }
}

struct Body {
    resource: Bytes,
    position: u64,
    chunk_size: u64,
    release: watch::Receiver<u64>,
    reset_at: Option<u64>,
    broken: bool,
    _guard: StreamGuard,
}

impl Body {
    async fn next_chunk(&mut self) -> Option<BridgeResult<Bytes>> {
        let len = self.resource.len() as u64;
        loop {
            if self.broken || self.position >= len {
                return None;
            }
            if self.reset_at.is_some_and(|at| self.position >= at) {
                self.broken = true;
                return Some(Err(BridgeError::OperationFailed(
                    "connection reset by peer".to_string(),
                )));
            }

            let released = (*self.release.borrow_and_update()).min(len);
            let limit = self.reset_at.map_or(released, |at| released.min(at));
            if self.position < limit {
                let end = (self.position + self.chunk_size).min(limit);
                let chunk = self.resource.slice(self.position as usize..end as usize);
                self.position = end;
                return Some(Ok(chunk));
            }

            if self.release.changed().await.is_err() {
                return None;
            }
        }
    }
}

struct StreamGuard(Arc<AtomicUsize>);

impl StreamGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Response log
// ============================================================================

/// Collects loader responses per request.
pub struct Responses {
    rx: UnboundedReceiver<LoaderResponse>,
    data: HashMap<RequestId, Vec<u8>>,
    slices: HashMap<RequestId, usize>,
    outcome: HashMap<RequestId, Result<(), LoaderError>>,
    terminal_count: HashMap<RequestId, usize>,
}

impl Responses {
    pub fn new(rx: UnboundedReceiver<LoaderResponse>) -> Self {
        Self {
            rx,
            data: HashMap::new(),
            slices: HashMap::new(),
            outcome: HashMap::new(),
            terminal_count: HashMap::new(),
        }
    }

    /// Wait for the terminal response of `id`; returns the bytes it received.
    pub async fn wait(&mut self, id: RequestId) -> Result<Vec<u8>, LoaderError> {
        while !self.outcome.contains_key(&id) {
            self.pump().await;
        }
        self.outcome[&id].clone()?;
        Ok(self.data(id).to_vec())
    }

    /// Wait until `id` has received at least `bytes` bytes.
    pub async fn wait_for_bytes(&mut self, id: RequestId, bytes: usize) {
        while self.data(id).len() < bytes {
            self.pump().await;
        }
    }

    /// Process responses that are already queued.
    pub fn settle(&mut self) {
        while let Ok(response) = self.rx.try_recv() {
            self.record(response);
        }
    }

    pub fn data(&self, id: RequestId) -> &[u8] {
        self.data.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn slices(&self, id: RequestId) -> usize {
        self.slices.get(&id).copied().unwrap_or(0)
    }

    pub fn is_done(&self, id: RequestId) -> bool {
        self.outcome.contains_key(&id)
    }

    /// Number of `Finished`/`Failed` responses `id` received.
    pub fn terminal_count(&self, id: RequestId) -> usize {
        self.terminal_count.get(&id).copied().unwrap_or(0)
    }

    async fn pump(&mut self) {
        let response = tokio::time::timeout(TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a loader response")
            .expect("loader response channel closed");
        self.record(response);
    }

    fn record(&mut self, response: LoaderResponse) {
        match response {
            LoaderResponse::Data { request, bytes } => {
                self.data.entry(request).or_default().extend_from_slice(&bytes);
                *self.slices.entry(request).or_default() += 1;
            }
            LoaderResponse::Finished { request } => {
                *self.terminal_count.entry(request).or_default() += 1;
                self.outcome.insert(request, Ok(()));
            }
            LoaderResponse::Failed { request, error } => {
                *self.terminal_count.entry(request).or_default() += 1;
                self.outcome.insert(request, Err(error));
            }
        }
    }
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
