//! # Event Bus System
//!
//! Broadcasts observer signals from the range cache core using `tokio::sync::broadcast`.
//! UI layers subscribe to download progress, cache completion, and error events without
//! holding any reference to the loader itself.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    emit     ┌───────────┐    subscribe    ┌────────────┐
//! │ LoadCoordinator├────────────>│ EventBus  ├────────────────>│ Progress UI│
//! └────────────────┘             │ (broadcast│                 └────────────┘
//!                                │  channel) │    subscribe    ┌────────────┐
//!                                │           ├────────────────>│ Logger     │
//!                                └───────────┘                 └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Cache(CacheEvent::Completed {
//!         resource: "a1b2".to_string(),
//!         total_length: 4096,
//!     }))
//!     .ok();
//!
//! let received = subscriber.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Cache(CacheEvent::Completed { .. })));
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Download Events
//! - `Started`: A download task began fetching at an offset
//! - `Progress`: Fraction of the resource received by the active task
//! - `Finished`: The task reached the end of the resource
//! - `Cancelled`: The task was superseded by a seek or torn down
//! - `Failed`: The transport or the cache file failed
//!
//! ### Cache Events
//! - `Completed`: A cache file was fully written and marked complete
//! - `Reused`: A complete cache file from an earlier run was found
//! - `Discarded`: A partial or corrupt cache file was thrown away
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Progress events are frequent, so slow subscribers should expect this.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Download task lifecycle and progress
    Download(DownloadEvent),
    /// Cache file lifecycle
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::Discarded { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::Completed { .. })
            | CoreEvent::Cache(CacheEvent::Reused { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Resource key the event refers to.
    pub fn resource(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.resource(),
            CoreEvent::Cache(e) => e.resource(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted for the active download task of a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A task started fetching.
    Started {
        /// Resource key.
        resource: String,
        /// Task identifier, unique per loader.
        task_id: u64,
        /// Absolute offset the fetch begins at.
        offset: u64,
        /// Whether the fetched bytes extend the persisted cache.
        cache_enabled: bool,
    },
    /// Bytes received by the active task relative to the resource size.
    Progress {
        resource: String,
        task_id: u64,
        /// In `[0.0, 1.0]`.
        fraction: f32,
    },
    /// The task received every byte up to the end of the resource.
    Finished { resource: String, task_id: u64 },
    /// The task was cancelled before finishing.
    Cancelled { resource: String, task_id: u64 },
    /// The task failed.
    Failed {
        resource: String,
        task_id: u64,
        /// Human-readable error message.
        message: String,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download progress",
            DownloadEvent::Finished { .. } => "Download finished",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::Failed { .. } => "Download failed",
        }
    }

    fn resource(&self) -> &str {
        match self {
            DownloadEvent::Started { resource, .. }
            | DownloadEvent::Progress { resource, .. }
            | DownloadEvent::Finished { resource, .. }
            | DownloadEvent::Cancelled { resource, .. }
            | DownloadEvent::Failed { resource, .. } => resource,
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events about the persisted cache file of a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// The cache file now holds the whole resource.
    Completed { resource: String, total_length: u64 },
    /// A complete cache file from an earlier run will be served without network access.
    Reused { resource: String, total_length: u64 },
    /// A partial or unreadable cache file was removed.
    Discarded { resource: String, reason: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Completed { .. } => "Cache file completed",
            CacheEvent::Reused { .. } => "Cache file reused",
            CacheEvent::Discarded { .. } => "Cache file discarded",
        }
    }

    fn resource(&self) -> &str {
        match self {
            CacheEvent::Completed { resource, .. }
            | CacheEvent::Reused { resource, .. }
            | CacheEvent::Discarded { resource, .. } => resource,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with predicate filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let cache_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Cache(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match the predicate will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(task_id: u64) -> CoreEvent {
        CoreEvent::Download(DownloadEvent::Started {
            resource: "res".to_string(),
            task_id,
            offset: 0,
            cache_enabled: true,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Download(DownloadEvent::Progress {
            resource: "res".to_string(),
            task_id: 3,
            fraction: 0.25,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Cache(_)));

        bus.emit(started(1)).ok();
        let completed = CoreEvent::Cache(CacheEvent::Completed {
            resource: "res".to_string(),
            total_length: 1000,
        });
        bus.emit(completed.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), completed);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(i)).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Download(DownloadEvent::Failed {
            resource: "res".to_string(),
            task_id: 1,
            message: "connection reset".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let discarded = CoreEvent::Cache(CacheEvent::Discarded {
            resource: "res".to_string(),
            reason: "no completion marker".to_string(),
        });
        assert_eq!(discarded.severity(), EventSeverity::Warning);

        let reused = CoreEvent::Cache(CacheEvent::Reused {
            resource: "res".to_string(),
            total_length: 10,
        });
        assert_eq!(reused.severity(), EventSeverity::Info);

        assert_eq!(started(1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description_and_resource() {
        let event = CoreEvent::Download(DownloadEvent::Cancelled {
            resource: "abc".to_string(),
            task_id: 9,
        });
        assert_eq!(event.description(), "Download cancelled");
        assert_eq!(event.resource(), "abc");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Download(DownloadEvent::Started {
            resource: "res-123".to_string(),
            task_id: 4,
            offset: 10_000,
            cache_enabled: false,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("res-123"));
        assert!(json.contains("\"type\":\"Download\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(started(i)).ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(CoreEvent::Download(DownloadEvent::Progress {
                    resource: "res".to_string(),
                    task_id: 1,
                    fraction: i as f32 / 10.0,
                }))
                .ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
