//! # Resource Loader Adapter
//!
//! Decoder-facing entry point. Spawns the coordinator on a single actor task
//! and exposes a cloneable [`LoaderHandle`] for issuing reads.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐ read/cancel ┌──────────────┐  Command   ┌────────────────────────┐
//! │ Decoder ├────────────>│ LoaderHandle ├───────────>│ actor: LoadCoordinator │
//! │         │             └──────────────┘            │   tokio::select! over  │
//! │         │          LoaderResponse                 │   commands and task    │
//! │         │<────────────────────────────────────────┤   messages             │
//! └─────────┘                                         └────────────────────────┘
//! ```
//!
//! Opening the cache happens in [`ResourceLoaderAdapter::spawn`], before any
//! request: a complete cache from an earlier run is reused and every read is
//! answered from disk without touching the network. Cache files are reached
//! through the host's [`FileSystemAccess`] bridge.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioFileSystem;
//! use core_loader::{LoaderConfig, LoaderResponse, ResourceLoaderAdapter};
//!
//! let fs = Arc::new(TokioFileSystem::new());
//! let (adapter, mut responses) =
//!     ResourceLoaderAdapter::spawn(url, LoaderConfig::default(), fetcher, fs, None).await?;
//! let handle = adapter.handle();
//!
//! let request = handle.read(0, 64 * 1024)?;
//! while let Some(response) = responses.recv().await {
//!     match response {
//!         LoaderResponse::Data { bytes, .. } => decoder.feed(bytes),
//!         LoaderResponse::Finished { .. } => break,
//!         LoaderResponse::Failed { error, .. } => return Err(error),
//!     }
//! }
//!
//! adapter.shutdown().await?;
//! ```

use crate::config::LoaderConfig;
use crate::coordinator::{LoadCoordinator, SharedContentInfo};
use crate::error::{LoaderError, Result};
use crate::identity::ResourceIdentity;
use crate::request::{ContentInfo, LoaderResponse, RequestId};
use crate::stats::{LoaderStats, SharedStats};
use crate::store::CacheStore;
use crate::task::TaskMessage;
use bridge_traits::http::RangeFetcher;
use bridge_traits::storage::FileSystemAccess;
use core_runtime::events::EventBus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

#[derive(Debug)]
enum Command {
    Read {
        request: RequestId,
        offset: u64,
        length: u64,
        seek: bool,
    },
    Cancel(RequestId),
    NotifySeek,
    Shutdown,
}

// ============================================================================
// LoaderHandle
// ============================================================================

/// Cloneable decoder-side handle of a running loader.
#[derive(Clone)]
pub struct LoaderHandle {
    identity: ResourceIdentity,
    commands: UnboundedSender<Command>,
    next_request: Arc<AtomicU64>,
    stats: SharedStats,
    content_info: SharedContentInfo,
}

impl LoaderHandle {
    /// Request `length` bytes starting at `offset`.
    ///
    /// Responses for the returned id arrive on the adapter's response channel.
    pub fn read(&self, offset: u64, length: u32) -> Result<RequestId> {
        self.submit(offset, length, false)
    }

    /// Request bytes after a user-initiated seek.
    ///
    /// A seek never waits on the active download unless the offset is already
    /// inside its fetched range.
    pub fn read_seeking(&self, offset: u64, length: u32) -> Result<RequestId> {
        self.submit(offset, length, true)
    }

    /// Withdraw a request. No further responses are sent for it.
    pub fn cancel(&self, request: RequestId) -> Result<()> {
        self.send(Command::Cancel(request))
    }

    /// Mark the next read request as a seek.
    pub fn notify_seek(&self) -> Result<()> {
        self.send(Command::NotifySeek)
    }

    /// Content type, length and range support, once the length is known.
    pub fn content_info(&self) -> Option<ContentInfo> {
        self.content_info.read().clone()
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats.lock().clone()
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn submit(&self, offset: u64, length: u32, seek: bool) -> Result<RequestId> {
        let request = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        self.send(Command::Read {
            request,
            offset,
            length: u64::from(length),
            seek,
        })?;
        Ok(request)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| LoaderError::ShutDown)
    }
}

// ============================================================================
// ResourceLoaderAdapter
// ============================================================================

/// Owner of one loader actor.
pub struct ResourceLoaderAdapter {
    handle: LoaderHandle,
    actor: JoinHandle<()>,
}

impl ResourceLoaderAdapter {
    /// Open the cache for `url` and spawn the loader actor.
    ///
    /// `url` may be the origin URL or its loader-scheme form. Must be called
    /// from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid
    /// - `url` is not an absolute URL
    /// - The cache directory cannot be created or inspected
    #[instrument(skip(config, fetcher, fs, event_bus))]
    pub async fn spawn(
        url: &str,
        config: LoaderConfig,
        fetcher: Arc<dyn RangeFetcher>,
        fs: Arc<dyn FileSystemAccess>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Result<(Self, UnboundedReceiver<LoaderResponse>)> {
        config.validate().map_err(LoaderError::Config)?;
        let identity = ResourceIdentity::from_url(url)?;

        let mut store = CacheStore::new(&config.cache_directory, fs);
        let outcome = store.open(&identity).await?;
        debug!(resource = identity.short_key(), ?outcome, "Cache opened");

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let coordinator = LoadCoordinator::new(
            identity.clone(),
            config,
            store,
            fetcher,
            task_tx,
            response_tx,
        )
        .with_event_bus(event_bus);
        coordinator.on_store_opened(&outcome);

        let handle = LoaderHandle {
            identity,
            commands: command_tx,
            next_request: Arc::new(AtomicU64::new(1)),
            stats: coordinator.stats(),
            content_info: coordinator.content_info(),
        };

        let actor = tokio::spawn(run_actor(coordinator, command_rx, task_rx));
        info!(resource = handle.identity.short_key(), "Resource loader started");

        Ok((Self { handle, actor }, response_rx))
    }

    pub fn handle(&self) -> LoaderHandle {
        self.handle.clone()
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.handle.identity
    }

    /// Cancel the active download, fail pending requests with
    /// [`LoaderError::ShutDown`] and wait for the actor to exit.
    pub async fn shutdown(self) -> Result<()> {
        // The actor may already be gone if every handle was dropped
        self.handle.send(Command::Shutdown).ok();
        self.actor
            .await
            .map_err(|e| LoaderError::Internal(format!("Loader actor failed: {}", e)))
    }
}

async fn run_actor(
    mut coordinator: LoadCoordinator,
    mut commands: UnboundedReceiver<Command>,
    mut task_events: UnboundedReceiver<TaskMessage>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Read { request, offset, length, seek }) => {
                    coordinator.on_read_request(request, offset, length, seek).await;
                }
                Some(Command::Cancel(request)) => coordinator.on_read_cancelled(request),
                Some(Command::NotifySeek) => coordinator.notify_seek(),
                Some(Command::Shutdown) | None => break,
            },
            Some(message) = task_events.recv() => coordinator.on_task_message(message).await,
        }
    }

    if let Some(runner) = coordinator.shutdown().await {
        if let Err(e) = runner.await {
            debug!(error = %e, "Download runner ended abnormally");
        }
    }
}
