//! # Progressive Range Cache Loader
//!
//! Serves a decoder's byte-range reads of a streamed media resource from a
//! disk-backed cache, downloading only the bytes that are not cached yet.
//!
//! ## Overview
//!
//! This module handles:
//! - Resource identity and the per-resource cache files
//! - One in-flight ranged download at a time, cancelled on seek
//! - Routing and draining of concurrent pending read requests
//! - Reuse of a complete cache file across runs, without network access
//!
//! ## Components
//!
//! - [`CacheStore`]: append-only data file, completion marker and probe spool
//! - [`DownloadTask`]: streams one ranged fetch into the store
//! - [`LoadCoordinator`]: decides per request between cache, current task and
//!   a new task
//! - [`ResourceLoaderAdapter`]: decoder-facing actor and [`LoaderHandle`]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod loader;
pub mod request;
pub mod stats;
pub mod store;
pub mod task;

pub use config::LoaderConfig;
pub use coordinator::LoadCoordinator;
pub use error::{LoaderError, Result};
pub use identity::{to_loader_url, to_origin_url, ResourceIdentity};
pub use loader::{LoaderHandle, ResourceLoaderAdapter};
pub use request::{ContentInfo, LoaderResponse, RequestId};
pub use stats::LoaderStats;
pub use store::{CacheInfo, CacheStore, CompletionMarker, OpenOutcome, SharedStore};
pub use task::{DownloadTask, TaskEvent, TaskId, TaskMessage, TaskState};
