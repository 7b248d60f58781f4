//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the range cache core:
//! - Logging and tracing infrastructure
//! - Event bus for download and cache observers
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the loader depends on.
//! It establishes the logging conventions and the event broadcasting
//! mechanism used throughout the workspace.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{CacheEvent, CoreEvent, DownloadEvent, EventBus, EventSeverity, EventStream};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
