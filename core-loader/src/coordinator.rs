//! # Load Coordinator
//!
//! Request router for one resource.
//!
//! ## Overview
//!
//! The coordinator owns the pending read requests and at most one
//! [`DownloadTask`]. The loader actor feeds it decoder commands and task
//! messages one at a time and awaits each handler before taking the next, so
//! the pending set and the active-task slot are never touched from two places
//! at once. Handlers await the store lock for cache file I/O.
//!
//! ## Routing
//!
//! For every new request, and whenever the active task's range grows, pending
//! requests are drained in arrival order. Bytes come from the persisted cache
//! (below the write cursor) or from the probe spool of the active probe task.
//! A request that still needs bytes is then routed:
//!
//! 1. Its next byte lies inside the active task's fetched range, or at the
//!    growing edge: attach to the task.
//! 2. No seek flag, and the byte is at most `max_lookahead_bytes` past the
//!    task's edge: attach and wait for the task to get there.
//! 3. Otherwise: cancel the active task and start a new one. The new task
//!    starts at the cache frontier with caching enabled when the target lies
//!    at most `frontier_slack_bytes` past the frontier, and at the target with
//!    caching disabled (a probe) otherwise.
//!
//! Requests left behind by a restart stay pending. Once no task is running,
//! the oldest pending request is routed again.

use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::identity::ResourceIdentity;
use crate::request::{ContentInfo, LoaderResponse, PendingRequest, RequestId};
use crate::stats::{LoaderStats, SharedStats};
use crate::store::{CacheStore, OpenOutcome, SharedStore};
use crate::task::{DownloadTask, TaskEvent, TaskId, TaskMessage};
use bridge_traits::http::RangeFetcher;
use bytes::Bytes;
use core_runtime::events::{CacheEvent, CoreEvent, DownloadEvent, EventBus};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Content metadata shared with loader handles.
pub type SharedContentInfo = Arc<RwLock<Option<ContentInfo>>>;

pub struct LoadCoordinator {
    identity: ResourceIdentity,
    config: LoaderConfig,
    store: SharedStore,
    fetcher: Arc<dyn RangeFetcher>,
    event_bus: Option<Arc<EventBus>>,
    task_events: UnboundedSender<TaskMessage>,
    responses: UnboundedSender<LoaderResponse>,
    active: Option<DownloadTask>,
    next_task_id: TaskId,
    pending: VecDeque<PendingRequest>,
    file_length: Option<u64>,
    content_type: Option<String>,
    seek_requested: bool,
    stats: SharedStats,
    content_info: SharedContentInfo,
}

impl LoadCoordinator {
    /// Create a coordinator over an already opened store.
    ///
    /// Length and content type of a reused complete cache are known up front,
    /// so [`content_info`](Self::content_info) answers before the first read.
    pub fn new(
        identity: ResourceIdentity,
        config: LoaderConfig,
        store: CacheStore,
        fetcher: Arc<dyn RangeFetcher>,
        task_events: UnboundedSender<TaskMessage>,
        responses: UnboundedSender<LoaderResponse>,
    ) -> Self {
        let (file_length, content_type) = match store.info(&identity) {
            Some(info) => (info.total_length, info.content_type),
            None => (None, None),
        };

        let coordinator = Self {
            identity,
            config,
            store: store.into_shared(),
            fetcher,
            event_bus: None,
            task_events,
            responses,
            active: None,
            next_task_id: 1,
            pending: VecDeque::new(),
            file_length,
            content_type,
            seek_requested: false,
            stats: Arc::new(Mutex::new(LoaderStats::default())),
            content_info: Arc::new(RwLock::new(None)),
        };
        coordinator.publish_content_info();
        coordinator
    }

    /// Publish observer events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: Option<Arc<EventBus>>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    pub fn content_info(&self) -> SharedContentInfo {
        Arc::clone(&self.content_info)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_task(&self) -> Option<&DownloadTask> {
        self.active.as_ref()
    }

    /// Report what opening the store found.
    pub fn on_store_opened(&self, outcome: &OpenOutcome) {
        match outcome {
            OpenOutcome::Reused { total_length } => {
                self.emit(CoreEvent::Cache(CacheEvent::Reused {
                    resource: self.resource(),
                    total_length: *total_length,
                }));
            }
            OpenOutcome::Discarded { reason } => {
                self.emit(CoreEvent::Cache(CacheEvent::Discarded {
                    resource: self.resource(),
                    reason: reason.clone(),
                }));
            }
            OpenOutcome::Fresh | OpenOutcome::AlreadyOpen => {}
        }
    }

    // ========================================================================
    // Decoder commands
    // ========================================================================

    /// Handle a new read request for `[offset, offset + length)`.
    ///
    /// `seek` marks a non-sequential jump; a flag set by
    /// [`notify_seek`](Self::notify_seek) applies to this request too.
    ///
    /// A range whose end does not fit in `u64` fails with
    /// [`LoaderError::InvalidRange`], reporting the total as `u64::MAX` while
    /// the length is still unknown.
    pub async fn on_read_request(&mut self, id: RequestId, offset: u64, length: u64, seek: bool) {
        let seek = std::mem::take(&mut self.seek_requested) || seek;
        debug!(request = %id, offset, length, seek, "Read request");

        if length == 0 {
            self.finish(id);
            return;
        }

        if offset.checked_add(length).is_none() {
            let total = self.file_length.unwrap_or(u64::MAX);
            self.fail(id, LoaderError::InvalidRange { offset, length, total });
            return;
        }

        let mut length = length;
        if let Some(total) = self.file_length {
            if offset >= total {
                self.fail(id, LoaderError::InvalidRange { offset, length, total });
                return;
            }
            length = length.min(total - offset);
        }

        self.pending.push_back(PendingRequest::new(id, offset, length));
        self.drain().await;
        if self.position(id).is_some() {
            self.route(id, seek).await;
        }
        self.ensure_progress().await;
    }

    /// Withdraw a request. It receives no further responses.
    pub fn on_read_cancelled(&mut self, id: RequestId) {
        match self.position(id) {
            Some(index) => {
                self.pending.remove(index);
                self.stats.lock().requests_cancelled += 1;
                debug!(request = %id, "Read request cancelled");
            }
            None => trace!(request = %id, "Cancel for a request that is no longer pending"),
        }
    }

    /// Treat the next read request as a seek.
    pub fn notify_seek(&mut self) {
        self.seek_requested = true;
    }

    /// Cancel the active task and fail every pending request.
    ///
    /// Returns the runner of the cancelled task so the caller can wait for it.
    pub async fn shutdown(&mut self) -> Option<JoinHandle<()>> {
        info!(
            resource = self.identity.short_key(),
            pending = self.pending.len(),
            "Shutting down loader"
        );

        let mut runner = None;
        if let Some(mut task) = self.active.take() {
            self.retire(&mut task).await;
            runner = task.take_handle();
        }

        let ids: Vec<RequestId> = self.pending.drain(..).map(|request| request.id).collect();
        for id in ids {
            self.fail(id, LoaderError::ShutDown);
        }
        runner
    }

    // ========================================================================
    // Task messages
    // ========================================================================

    /// Apply a message from a download task. Messages from a task that is no
    /// longer the running active task are dropped.
    pub async fn on_task_message(&mut self, message: TaskMessage) {
        let TaskMessage { task_id, event } = message;

        let grown = match self.active.as_mut() {
            Some(task) if task.id() == task_id && task.is_running() => {
                let before = task.cache_length();
                task.apply(&event);
                task.cache_length() - before
            }
            _ => {
                trace!(task_id, "Dropping message from an inactive task");
                return;
            }
        };
        self.stats.lock().bytes_downloaded += grown;

        match event {
            TaskEvent::Responded {
                total_length,
                content_type,
                accepts_ranges,
            } => {
                self.on_responded(total_length, content_type, accepts_ranges)
                    .await
            }
            TaskEvent::RangeGrew { .. } => self.on_range_grew(task_id).await,
            TaskEvent::Finished { .. } => self.on_task_finished(task_id).await,
            TaskEvent::Failed(error) => self.on_task_failed(task_id, error).await,
        }

        self.ensure_progress().await;
    }

    async fn on_responded(
        &mut self,
        total_length: Option<u64>,
        content_type: Option<String>,
        accepts_ranges: bool,
    ) {
        if !accepts_ranges {
            warn!(
                resource = self.identity.short_key(),
                "Server did not advertise byte range support"
            );
        }
        if total_length.is_some() {
            self.file_length = total_length;
        }
        if content_type.is_some() {
            self.content_type = content_type;
        }
        self.publish_content_info();
        self.clamp_pending();
        self.drain().await;
    }

    async fn on_range_grew(&mut self, task_id: TaskId) {
        if let Some(fraction) = self.active.as_ref().and_then(DownloadTask::fraction) {
            self.emit(CoreEvent::Download(DownloadEvent::Progress {
                resource: self.resource(),
                task_id,
                fraction,
            }));
        }
        self.drain().await;
    }

    async fn on_task_finished(&mut self, task_id: TaskId) {
        let (cache_enabled, file_length) = match self.active.as_ref() {
            Some(task) => (task.cache_enabled(), task.file_length()),
            None => return,
        };
        info!(task_id, cache_enabled, "Download task finished");

        if self.file_length.is_none() {
            self.file_length = file_length;
            self.publish_content_info();
        }

        self.emit(CoreEvent::Download(DownloadEvent::Finished {
            resource: self.resource(),
            task_id,
        }));
        if cache_enabled {
            if let Some(total_length) = self.file_length {
                self.emit(CoreEvent::Cache(CacheEvent::Completed {
                    resource: self.resource(),
                    total_length,
                }));
            }
        }

        self.clamp_pending();
        self.drain().await;
    }

    async fn on_task_failed(&mut self, task_id: TaskId, error: LoaderError) {
        warn!(task_id, error = %error, "Download task failed");
        self.emit(CoreEvent::Download(DownloadEvent::Failed {
            resource: self.resource(),
            task_id,
            message: error.to_string(),
        }));

        if let Some(task) = self.active.take() {
            if !task.cache_enabled() {
                self.discard_probe().await;
            }
        }

        let mut index = 0;
        while index < self.pending.len() {
            if self.pending[index].task == Some(task_id) {
                if let Some(request) = self.pending.remove(index) {
                    self.fail(request.id, error.clone());
                }
            } else {
                index += 1;
            }
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    async fn route(&mut self, id: RequestId, seek: bool) {
        let Some(index) = self.position(id) else {
            return;
        };
        let current = self.pending[index].current_offset;

        if let Some(task) = self.active.as_ref().filter(|task| task.is_running()) {
            if accepts(task, self.config.max_lookahead_bytes, current, seek) {
                self.pending[index].task = Some(task.id());
                trace!(request = %id, task_id = task.id(), "Attached to active task");
                return;
            }
        }

        match self.start_task(current).await {
            Ok(Some(task_id)) => {
                if let Some(index) = self.position(id) {
                    self.pending[index].task = Some(task_id);
                }
                self.attach_waiting();
            }
            Ok(None) => {}
            Err(error) => {
                warn!(request = %id, error = %error, "Failed to start download task");
                if let Some(index) = self.position(id) {
                    self.pending.remove(index);
                }
                self.fail(id, error);
            }
        }
        self.drain().await;
    }

    /// Route the oldest pending request while no task is running.
    async fn ensure_progress(&mut self) {
        while !self.has_running_task() {
            let Some(id) = self.pending.front().map(|request| request.id) else {
                break;
            };
            self.route(id, false).await;
            if self.position(id).is_some() && !self.has_running_task() {
                break;
            }
        }
    }

    /// Attach every waiting request the running task will reach.
    fn attach_waiting(&mut self) {
        let Some(task) = self.active.as_ref().filter(|task| task.is_running()) else {
            return;
        };
        let task_id = task.id();
        for request in self.pending.iter_mut() {
            if request.task != Some(task_id)
                && accepts(task, self.config.max_lookahead_bytes, request.current_offset, false)
            {
                request.task = Some(task_id);
            }
        }
    }

    /// Replace the active task with a new one for `target`.
    ///
    /// Returns `None` when the cache already holds the whole resource.
    async fn start_task(&mut self, target: u64) -> Result<Option<TaskId>> {
        if let Some(mut old) = self.active.take() {
            self.retire(&mut old).await;
        }

        // The old runner writes nothing once cancelled and the lock is ours
        let (offset, cache_enabled) = {
            let mut store = self.store.lock().await;
            let info = store.info(&self.identity).ok_or_else(|| {
                LoaderError::Internal("cache file is not open".to_string())
            })?;
            if info.is_complete {
                return Ok(None);
            }

            let frontier = info.write_cursor;
            let cache_enabled = target <= frontier.saturating_add(self.config.frontier_slack_bytes);
            if cache_enabled {
                store.discard_probe(&self.identity).await?;
                if frontier == 0 {
                    store.reset(&self.identity).await?;
                }
                (frontier, true)
            } else {
                store.reset_probe(&self.identity).await?;
                (target, false)
            }
        };

        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let mut task = DownloadTask::new(task_id, self.identity.clone(), offset, cache_enabled)
            .with_file_length(self.file_length);
        task.start(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.store),
            self.task_events.clone(),
        );
        self.active = Some(task);
        self.stats.lock().network_fetches += 1;

        info!(task_id, offset, target, cache_enabled, "Started download task");
        self.emit(CoreEvent::Download(DownloadEvent::Started {
            resource: self.resource(),
            task_id,
            offset,
            cache_enabled,
        }));
        Ok(Some(task_id))
    }

    /// Cancel a task that is leaving the active slot.
    async fn retire(&self, task: &mut DownloadTask) {
        if task.is_running() {
            task.cancel();
            self.stats.lock().tasks_cancelled += 1;
            debug!(task_id = task.id(), "Cancelled download task");
            self.emit(CoreEvent::Download(DownloadEvent::Cancelled {
                resource: self.resource(),
                task_id: task.id(),
            }));
        }
        if !task.cache_enabled() {
            self.discard_probe().await;
        }
    }

    // ========================================================================
    // Drain
    // ========================================================================

    /// Deliver every available byte to pending requests, in arrival order.
    async fn drain(&mut self) {
        let mut index = 0;
        while index < self.pending.len() {
            match self.serve(index).await {
                Ok(true) => {
                    if let Some(request) = self.pending.remove(index) {
                        self.finish(request.id);
                    }
                }
                Ok(false) => index += 1,
                Err(error) => {
                    if let Some(request) = self.pending.remove(index) {
                        warn!(request = %request.id, error = %error, "Failed to serve read request");
                        self.fail(request.id, error);
                    }
                }
            }
        }
    }

    /// Serve one request as far as possible. Returns true once it is complete.
    async fn serve(&mut self, index: usize) -> Result<bool> {
        loop {
            let (id, current, remaining) = {
                let request = &self.pending[index];
                (request.id, request.current_offset, request.remaining())
            };
            if remaining == 0 {
                return Ok(true);
            }

            let Some(bytes) = self.read_available(current, remaining).await? else {
                return Ok(false);
            };
            let delivered = bytes.len() as u64;
            self.pending[index].current_offset += delivered;
            self.stats.lock().bytes_delivered += delivered;
            self.send(LoaderResponse::Data { request: id, bytes });
        }
    }

    /// Next slice at `current`, from the persisted cache or the probe spool.
    async fn read_available(&self, current: u64, remaining: u64) -> Result<Option<Bytes>> {
        let max = self.config.max_response_bytes as u64;
        let mut store = self.store.lock().await;
        let info = store
            .info(&self.identity)
            .ok_or_else(|| LoaderError::Internal("cache file is not open".to_string()))?;

        if current < info.write_cursor {
            let length = (info.write_cursor - current).min(remaining).min(max);
            let read = store.read(&self.identity, current, length as usize).await;
            return match read {
                Ok(bytes) => Ok(Some(bytes)),
                Err(error) if info.is_complete && error.is_io_error() => {
                    // Unreadable finished cache: throw it away and fetch again
                    warn!(error = %error, "Discarding unreadable cache file");
                    store.reset(&self.identity).await?;
                    drop(store);
                    self.emit(CoreEvent::Cache(CacheEvent::Discarded {
                        resource: self.resource(),
                        reason: error.to_string(),
                    }));
                    Ok(None)
                }
                Err(error) => Err(error),
            };
        }

        if let Some(task) = self.active.as_ref().filter(|task| !task.cache_enabled()) {
            if current >= task.request_offset() && current < task.end() {
                let length = (task.end() - current).min(remaining).min(max);
                let bytes = store
                    .read_probe(&self.identity, current - task.request_offset(), length as usize)
                    .await?;
                return Ok(Some(bytes));
            }
        }

        Ok(None)
    }

    /// Fail requests that start past the now known end, clamp the rest.
    fn clamp_pending(&mut self) {
        let Some(total) = self.file_length else {
            return;
        };

        let mut index = 0;
        while index < self.pending.len() {
            let request = &mut self.pending[index];
            if request.offset >= total {
                let error = LoaderError::InvalidRange {
                    offset: request.offset,
                    length: request.length,
                    total,
                };
                if let Some(request) = self.pending.remove(index) {
                    self.fail(request.id, error);
                }
                continue;
            }
            if request.end() > total {
                request.length = total - request.offset;
            }
            index += 1;
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn position(&self, id: RequestId) -> Option<usize> {
        self.pending.iter().position(|request| request.id == id)
    }

    fn has_running_task(&self) -> bool {
        self.active.as_ref().is_some_and(DownloadTask::is_running)
    }

    async fn discard_probe(&self) {
        let mut store = self.store.lock().await;
        if let Err(error) = store.discard_probe(&self.identity).await {
            warn!(error = %error, "Failed to discard probe spool");
        }
    }

    fn finish(&self, id: RequestId) {
        self.stats.lock().requests_finished += 1;
        trace!(request = %id, "Read request finished");
        self.send(LoaderResponse::Finished { request: id });
    }

    fn fail(&self, id: RequestId, error: LoaderError) {
        self.stats.lock().requests_failed += 1;
        debug!(request = %id, error = %error, "Read request failed");
        self.send(LoaderResponse::Failed { request: id, error });
    }

    fn send(&self, response: LoaderResponse) {
        if self.responses.send(response).is_err() {
            trace!("Response receiver dropped");
        }
    }

    fn publish_content_info(&self) {
        let Some(content_length) = self.file_length else {
            return;
        };
        let content_type = self
            .content_type
            .clone()
            .unwrap_or_else(|| self.config.default_content_type.clone());

        *self.content_info.write() = Some(ContentInfo {
            content_type,
            content_length,
            byte_range_access: true,
        });
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(event_bus) = &self.event_bus {
            event_bus.emit(event).ok();
        }
    }

    fn resource(&self) -> String {
        self.identity.key().to_string()
    }
}

/// Whether a request whose next byte is `current` can wait on `task`.
fn accepts(task: &DownloadTask, max_lookahead: u64, current: u64, seek: bool) -> bool {
    if task.covers(current) {
        return true;
    }
    !seek && current > task.end() && current - task.end() <= max_lookahead
}
