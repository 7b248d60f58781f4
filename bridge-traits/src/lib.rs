//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the range cache core and the
//! platform-specific network transport and file system. The core never talks to
//! an HTTP client directly: it asks a [`RangeFetcher`](http::RangeFetcher) to
//! start a GET at a byte offset and consumes the body as a cancellable stream.
//! Cache files are likewise reached only through
//! [`FileSystemAccess`](storage::FileSystemAccess).
//!
//! ## Traits
//!
//! - [`RangeFetcher`](http::RangeFetcher) - Open-ended ranged GET (`Range: bytes=N-`)
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Offset-addressed cache files
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert client-specific errors to `BridgeError` and
//! keep the HTTP status when the server answered.
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync`; the body stream is `Send` so a download
//! can run on a spawned task.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::http::{RangeFetcher, RangeRequest, RangeResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyFetcher;
//!
//! #[async_trait]
//! impl RangeFetcher for MyFetcher {
//!     async fn fetch(&self, request: RangeRequest) -> Result<RangeResponse> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;

pub use error::BridgeError;

pub use http::{
    parse_content_range, ByteStream, ContentRange, RangeFetcher, RangeRequest, RangeResponse,
};
pub use storage::{FileSystemAccess, OpenMode, RandomAccessFile};
