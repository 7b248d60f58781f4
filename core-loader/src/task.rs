//! # Download Task
//!
//! One in-flight ranged fetch from the transport into the [`CacheStore`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  start()   ┌──────────────────────┐  fetch   ┌──────────────┐
//! │ LoadCoordinator  ├───────────>│ runner (tokio task)  ├─────────>│ RangeFetcher │
//! │ owns DownloadTask│            │  append / append_probe           └──────────────┘
//! │ (bookkeeping)    │<───────────┤  under the store lock│
//! └──────────────────┘ TaskMessage└──────────────────────┘
//! ```
//!
//! The coordinator keeps the [`DownloadTask`] (identity, offsets, mirrored
//! progress, state) while the network receive path runs on a spawned tokio task.
//! The runner reports through [`TaskMessage`]s tagged with the task id, so the
//! coordinator can drop messages from a task it already replaced.
//!
//! Cancellation is cooperative through a [`CancellationToken`]. The runner
//! checks the token under the store lock before every write, so once
//! [`DownloadTask::cancel`] returns and the caller has acquired the lock, the
//! task writes nothing more.
//!
//! [`CacheStore`]: crate::store::CacheStore

use crate::error::{LoaderError, Result};
use crate::identity::ResourceIdentity;
use crate::store::{CacheStore, SharedStore};
use bridge_traits::http::{RangeFetcher, RangeRequest, RangeResponse};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Identifier of a download task, unique within one coordinator.
pub type TaskId = u64;

/// Lifecycle of a download task. All states after `Running` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

/// Progress reported by a running task.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Response headers arrived.
    Responded {
        total_length: Option<u64>,
        content_type: Option<String>,
        accepts_ranges: bool,
    },
    /// More bytes are available; `cache_length` counts from the task's offset.
    RangeGrew { cache_length: u64 },
    /// The task reached the end of the resource.
    Finished { cache_length: u64 },
    /// The fetch or a cache write failed.
    Failed(LoaderError),
}

/// A [`TaskEvent`] tagged with its source task.
#[derive(Debug, Clone)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub event: TaskEvent,
}

/// Coordinator-side record of one ranged fetch.
#[derive(Debug)]
pub struct DownloadTask {
    id: TaskId,
    identity: ResourceIdentity,
    request_offset: u64,
    cache_length: u64,
    file_length: Option<u64>,
    cache_enabled: bool,
    state: TaskState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DownloadTask {
    pub fn new(
        id: TaskId,
        identity: ResourceIdentity,
        request_offset: u64,
        cache_enabled: bool,
    ) -> Self {
        Self {
            id,
            identity,
            request_offset,
            cache_length: 0,
            file_length: None,
            cache_enabled,
            state: TaskState::Idle,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Carry over a total length learned by an earlier task.
    pub fn with_file_length(mut self, file_length: Option<u64>) -> Self {
        self.file_length = file_length;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn request_offset(&self) -> u64 {
        self.request_offset
    }

    pub fn cache_length(&self) -> u64 {
        self.cache_length
    }

    pub fn file_length(&self) -> Option<u64> {
        self.file_length
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    /// Absolute offset one past the last byte received.
    pub fn end(&self) -> u64 {
        self.request_offset + self.cache_length
    }

    /// Returns true if `offset` lies within the bytes this running task has
    /// fetched, or exactly at its growing edge.
    pub fn covers(&self, offset: u64) -> bool {
        self.is_running() && offset >= self.request_offset && offset <= self.end()
    }

    /// `cache_length / file_length`, once the total length is known.
    pub fn fraction(&self) -> Option<f32> {
        match self.file_length {
            Some(0) => Some(1.0),
            Some(total) => Some((self.cache_length as f64 / total as f64).min(1.0) as f32),
            None => None,
        }
    }

    /// Spawn the network receive path.
    pub fn start(
        &mut self,
        fetcher: Arc<dyn RangeFetcher>,
        store: SharedStore,
        events: UnboundedSender<TaskMessage>,
    ) {
        if self.state != TaskState::Idle {
            warn!(task_id = self.id, state = ?self.state, "Download task started twice");
            return;
        }

        let runner = TaskRunner {
            id: self.id,
            identity: self.identity.clone(),
            offset: self.request_offset,
            cache_enabled: self.cache_enabled,
            file_length: self.file_length,
            cache_length: 0,
            store,
            events,
            cancel: self.cancel.clone(),
        };

        self.state = TaskState::Running;
        self.handle = Some(tokio::spawn(runner.run(fetcher)));
    }

    /// Stop the network operation. Bytes already written stay in the store.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if !self.state.is_terminal() {
            self.state = TaskState::Cancelled;
        }
    }

    /// Detach the runner's join handle, so a caller can wait for it to exit.
    pub fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }

    #[cfg(test)]
    pub(crate) fn force_running(&mut self) {
        self.state = TaskState::Running;
    }

    /// Mirror a runner event into the coordinator-side bookkeeping.
    pub fn apply(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Responded { total_length, .. } => {
                if total_length.is_some() {
                    self.file_length = *total_length;
                }
            }
            TaskEvent::RangeGrew { cache_length } => {
                self.cache_length = self.cache_length.max(*cache_length);
            }
            TaskEvent::Finished { cache_length } => {
                self.cache_length = self.cache_length.max(*cache_length);
                self.file_length
                    .get_or_insert(self.request_offset + self.cache_length);
                self.state = TaskState::Completed;
            }
            TaskEvent::Failed(_) => {
                self.state = TaskState::Failed;
            }
        }
    }
}

impl Drop for DownloadTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Network receive path
// ============================================================================

struct TaskRunner {
    id: TaskId,
    identity: ResourceIdentity,
    offset: u64,
    cache_enabled: bool,
    file_length: Option<u64>,
    cache_length: u64,
    store: SharedStore,
    events: UnboundedSender<TaskMessage>,
    cancel: CancellationToken,
}

enum Step {
    Continue,
    Done,
}

impl TaskRunner {
    #[instrument(
        skip_all,
        fields(
            task_id = self.id,
            resource = self.identity.short_key(),
            offset = self.offset,
            cache_enabled = self.cache_enabled
        )
    )]
    async fn run(mut self, fetcher: Arc<dyn RangeFetcher>) {
        let request = RangeRequest::new(self.identity.url(), self.offset);

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Cancelled before the response arrived");
                return;
            }
            response = fetcher.fetch(request) => response,
        };

        let mut response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Ranged fetch failed");
                self.fail(e.into());
                return;
            }
        };

        match self.record_response(&mut response).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                self.fail(e);
                return;
            }
        }

        if self.reached_end() {
            self.finish().await;
            return;
        }

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(cache_length = self.cache_length, "Download cancelled");
                    return;
                }
                chunk = response.body.next() => chunk,
            };

            let step = match chunk {
                Some(Ok(bytes)) => self.receive(bytes).await,
                Some(Err(e)) => {
                    warn!(error = %e, cache_length = self.cache_length, "Body stream failed");
                    Err(e.into())
                }
                None => self.end_of_stream().await,
            };

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Done) => return,
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    /// Record the declared length and type. Returns false once cancelled.
    async fn record_response(&mut self, response: &mut RangeResponse) -> Result<bool> {
        let total_length = response.total_length.or(self.file_length);
        self.file_length = total_length;

        {
            let mut store = self.store.lock().await;
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            if let Some(total) = total_length {
                store.set_total_length(&self.identity, total)?;
            }
            store.set_content_type(&self.identity, response.content_type.clone())?;
        }

        debug!(
            status = response.status,
            total_length = ?total_length,
            "Download responded"
        );
        Ok(self.send(TaskEvent::Responded {
            total_length,
            content_type: response.content_type.clone(),
            accepts_ranges: response.accepts_ranges,
        }))
    }

    async fn receive(&mut self, mut bytes: Bytes) -> Result<Step> {
        if let Some(total) = self.file_length {
            let remaining = total.saturating_sub(self.offset + self.cache_length);
            if (bytes.len() as u64) > remaining {
                bytes.truncate(remaining as usize);
            }
        }
        if bytes.is_empty() {
            return Ok(Step::Continue);
        }

        {
            let mut store = self.store.lock().await;
            if self.cancel.is_cancelled() {
                return Ok(Step::Done);
            }
            if self.cache_enabled {
                store.append(&self.identity, &bytes).await?;
            } else {
                store.append_probe(&self.identity, &bytes).await?;
            }
        }

        self.cache_length += bytes.len() as u64;
        if !self.send(TaskEvent::RangeGrew {
            cache_length: self.cache_length,
        }) {
            return Ok(Step::Done);
        }

        if self.reached_end() {
            self.finish().await;
            return Ok(Step::Done);
        }
        Ok(Step::Continue)
    }

    async fn end_of_stream(&mut self) -> Result<Step> {
        match self.file_length {
            Some(total) if self.offset + self.cache_length < total => {
                Err(LoaderError::Network(format!(
                    "connection closed after {} of {} bytes",
                    self.offset + self.cache_length,
                    total
                )))
            }
            _ => {
                self.finish().await;
                Ok(Step::Done)
            }
        }
    }

    fn reached_end(&self) -> bool {
        matches!(self.file_length, Some(total) if self.offset + self.cache_length >= total)
    }

    async fn finish(&mut self) {
        let total = self.offset + self.cache_length;
        let result = {
            let mut store = self.store.lock().await;
            if self.cancel.is_cancelled() {
                return;
            }
            self.finalize(&mut store, total).await
        };

        match result {
            Ok(()) => {
                info!(cache_length = self.cache_length, "Download finished");
                self.send(TaskEvent::Finished {
                    cache_length: self.cache_length,
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to finalize cache file");
                self.fail(e);
            }
        }
    }

    async fn finalize(&self, store: &mut CacheStore, total: u64) -> Result<()> {
        if self.file_length.is_none() {
            store.set_total_length(&self.identity, total)?;
        }
        if self.cache_enabled {
            store.mark_complete(&self.identity).await?;
        }
        Ok(())
    }

    fn fail(&self, error: LoaderError) {
        self.send(TaskEvent::Failed(error));
    }

    /// Returns false once the task is cancelled or the coordinator is gone.
    fn send(&self, event: TaskEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.events
            .send(TaskMessage {
                task_id: self.id,
                event,
            })
            .is_ok()
    }
}
