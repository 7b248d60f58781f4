//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `RangeFetcher` using `reqwest` with an open-ended `Range` header
//! - `FileSystemAccess` on `tokio::fs` for the cache files
//! - Cache directory discovery using the `dirs` crate
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_cache_directory, ReqwestRangeFetcher, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fetcher = ReqwestRangeFetcher::new().expect("http client");
//!     let fs = TokioFileSystem::new();
//!     let cache_dir = default_cache_directory();
//!     // Hand the fetcher and file system to the loader, the directory to its config
//! }
//! ```

mod filesystem;
mod http;

pub use filesystem::{default_cache_directory, TokioFileSystem, CACHE_SUBDIRECTORY};
pub use http::ReqwestRangeFetcher;
