//! Loader configuration and routing thresholds

use std::path::PathBuf;

/// Default largest slice handed to the decoder in one `Data` response (256 KiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Default distance a sequential read may run ahead of the active download (1 MiB).
pub const DEFAULT_MAX_LOOKAHEAD_BYTES: u64 = 1024 * 1024;

/// Content type reported when the server does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Configuration for a [`ResourceLoaderAdapter`](crate::ResourceLoaderAdapter).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory holding the per-resource cache files
    pub cache_directory: PathBuf,

    /// How far past the cache frontier a new download may still start at the
    /// frontier with caching enabled (default: 0, only exact continuations)
    pub frontier_slack_bytes: u64,

    /// How far ahead of the active download a non-seek read may wait instead
    /// of restarting the download (default: 1 MiB)
    pub max_lookahead_bytes: u64,

    /// Largest single `Data` response (default: 256 KiB)
    pub max_response_bytes: usize,

    /// Content type used when the transport reports none (default: `video/mp4`)
    pub default_content_type: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_directory: std::env::temp_dir().join("rangecache"),
            frontier_slack_bytes: 0,
            max_lookahead_bytes: DEFAULT_MAX_LOOKAHEAD_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl LoaderConfig {
    /// Create a new loader configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache directory.
    pub fn with_cache_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_directory = dir.into();
        self
    }

    /// Set the frontier slack.
    pub fn with_frontier_slack(mut self, bytes: u64) -> Self {
        self.frontier_slack_bytes = bytes;
        self
    }

    /// Set the sequential lookahead window.
    pub fn with_max_lookahead(mut self, bytes: u64) -> Self {
        self.max_lookahead_bytes = bytes;
        self
    }

    /// Set the largest single response slice.
    pub fn with_max_response_bytes(mut self, bytes: usize) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    /// Set the fallback content type.
    pub fn with_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_directory.as_os_str().is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        if self.max_response_bytes == 0 {
            return Err("max_response_bytes must be greater than 0".to_string());
        }

        if self.default_content_type.trim().is_empty() {
            return Err("default_content_type cannot be empty".to_string());
        }

        Ok(())
    }
}
