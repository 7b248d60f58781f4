//! # Loader Error Types
//!
//! Errors surfaced to read requests and to the host.
//!
//! A single download failure is delivered to every read request that depended
//! on it, so [`LoaderError`] is `Clone`; I/O errors are kept behind an `Arc`.

use bridge_traits::BridgeError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading byte ranges of a resource.
#[derive(Error, Debug, Clone)]
pub enum LoaderError {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The ranged fetch failed or the connection dropped before completion.
    #[error("Network error: {0}")]
    Network(String),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Reading or writing a cache file failed.
    #[error("Cache I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A cache file does not hold the bytes its bookkeeping claims.
    #[error("Corrupt cache file: {0}")]
    CorruptCache(String),

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The read starts at or past the end of the resource.
    #[error("Invalid range: offset {offset} length {length} (resource is {total} bytes)")]
    InvalidRange { offset: u64, length: u64, total: u64 },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Invalid loader configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The loader was shut down before the request completed.
    #[error("Loader has been shut down")]
    ShutDown,

    /// Broken internal bookkeeping.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoaderError {
    /// Returns true if this error came from the transport.
    pub fn is_network_error(&self) -> bool {
        matches!(self, LoaderError::Network(_))
    }

    /// Returns true if this error came from the cache files.
    pub fn is_io_error(&self) -> bool {
        matches!(self, LoaderError::Io(_) | LoaderError::CorruptCache(_))
    }
}

impl From<io::Error> for LoaderError {
    fn from(err: io::Error) -> Self {
        LoaderError::Io(Arc::new(err))
    }
}

impl From<BridgeError> for LoaderError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(e) => LoaderError::Io(Arc::new(e)),
            other => LoaderError::Network(other.to_string()),
        }
    }
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_errors_map_to_network() {
        let err: LoaderError = BridgeError::HttpStatus {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
        .into();
        assert!(err.is_network_error());
        assert!(err.to_string().contains("503"));

        let err: LoaderError = BridgeError::RangeNotSatisfiable { offset: 10 }.into();
        assert!(err.is_network_error());
    }

    #[test]
    fn test_bridge_io_maps_to_io() {
        let err: LoaderError =
            BridgeError::Io(io::Error::new(io::ErrorKind::Other, "disk gone")).into();
        assert!(err.is_io_error());
        assert!(!err.is_network_error());
    }

    #[test]
    fn test_error_is_cloneable_for_fan_out() {
        let err = LoaderError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let copies = vec![err.clone(), err.clone()];
        assert!(copies.iter().all(LoaderError::is_io_error));
    }

    #[test]
    fn test_invalid_range_message() {
        let err = LoaderError::InvalidRange {
            offset: 5000,
            length: 10,
            total: 4096,
        };
        assert_eq!(
            err.to_string(),
            "Invalid range: offset 5000 length 10 (resource is 4096 bytes)"
        );
    }
}
