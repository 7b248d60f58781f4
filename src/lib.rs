//! Workspace facade crate.
//!
//! Re-exports the workspace crates so a host application can depend on
//! `rangecache` alone and pick the platform bridge through feature flags.
//!
//! ```ignore
//! use rangecache::bridge_desktop::{default_cache_directory, ReqwestRangeFetcher, TokioFileSystem};
//! use rangecache::core_loader::{LoaderConfig, ResourceLoaderAdapter};
//! use std::sync::Arc;
//!
//! # async fn run() -> rangecache::core_loader::Result<()> {
//! let config = LoaderConfig::new().with_cache_directory(default_cache_directory());
//! let fetcher = Arc::new(ReqwestRangeFetcher::new()?);
//! let fs = Arc::new(TokioFileSystem::new());
//! let url = "https://example.com/clip.mp4";
//! let (adapter, mut responses) =
//!     ResourceLoaderAdapter::spawn(url, config, fetcher, fs, None).await?;
//! let request = adapter.handle().read(0, 64 * 1024)?;
//! # Ok(())
//! # }
//! ```

pub use bridge_traits;
pub use core_loader;
pub use core_runtime;

#[cfg(feature = "desktop")]
pub use bridge_desktop;
