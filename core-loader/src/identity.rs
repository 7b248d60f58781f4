//! Resource identity and the loader URL scheme
//!
//! A resource is identified by its canonical origin URL: parsed with
//! [`url::Url`] (scheme and host lowercased, default port dropped), the
//! fragment removed and the loader scheme (see [`to_loader_url`]) mapped back,
//! so every spelling of a URL shares one cache file. The cache key is the
//! lowercase hex SHA-256 of that canonical URL.

use crate::error::{LoaderError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Private scheme that routes decoder reads to the loader.
pub const LOADER_SCHEME: &str = "streaming";

/// Extension of the cache data file.
pub const DATA_EXTENSION: &str = "cache";
/// Extension of the completion marker.
pub const MARKER_EXTENSION: &str = "complete";
/// Extension of the probe spool.
pub const PROBE_EXTENSION: &str = "probe";

/// Stable key of one remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    url: String,
    key: String,
}

impl ResourceIdentity {
    /// Derive the identity of `url`, accepting both origin and loader URLs.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = canonical_url(url)?;
        let key = hex::encode(Sha256::digest(url.as_bytes()));
        Ok(Self { url, key })
    }

    /// Canonical origin URL, the one fetched over the network.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hex key naming the cache files.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shortened key for log lines.
    pub fn short_key(&self) -> &str {
        &self.key[..12]
    }

    pub fn data_file_name(&self) -> String {
        format!("{}.{}", self.key, DATA_EXTENSION)
    }

    pub fn marker_file_name(&self) -> String {
        format!("{}.{}", self.key, MARKER_EXTENSION)
    }

    pub fn probe_file_name(&self) -> String {
        format!("{}.{}", self.key, PROBE_EXTENSION)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Rewrite `url` to the loader scheme, keeping the origin scheme recoverable.
///
/// `https://cdn.example.com/a.mp4` becomes `streaming+https://cdn.example.com/a.mp4`.
/// URLs already in the loader scheme are returned unchanged.
pub fn to_loader_url(url: &str) -> Result<String> {
    let parsed = parse(url)?;
    if is_loader_scheme(parsed.scheme()) {
        return Ok(parsed.into());
    }
    Ok(format!("{}+{}", LOADER_SCHEME, parsed))
}

/// Reverse [`to_loader_url`]. A bare `streaming://` URL maps to `https://`.
pub fn to_origin_url(url: &str) -> Result<String> {
    origin(url).map(String::from)
}

fn canonical_url(url: &str) -> Result<String> {
    let mut origin = origin(url)?;
    origin.set_fragment(None);
    Ok(origin.into())
}

fn origin(url: &str) -> Result<Url> {
    let parsed = parse(url)?;
    if !is_loader_scheme(parsed.scheme()) {
        return Ok(parsed);
    }

    let scheme = parsed.scheme();
    let origin_scheme = match scheme.split_once('+') {
        Some((_, origin)) if !origin.is_empty() => origin,
        _ => "https",
    };
    // Re-parse rather than `set_scheme`, which refuses to turn a custom scheme
    // into a special one and would skip host normalization
    parse(&format!("{}{}", origin_scheme, &parsed.as_str()[scheme.len()..]))
}

fn parse(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| LoaderError::Config(format!("Not an absolute URL: {:?} ({})", url, e)))?;
    if parsed.cannot_be_a_base() || !parsed.has_host() {
        return Err(LoaderError::Config(format!(
            "Not a hierarchical URL with a host: {:?}",
            url
        )));
    }
    Ok(parsed)
}

fn is_loader_scheme(scheme: &str) -> bool {
    scheme == LOADER_SCHEME || scheme.starts_with("streaming+")
}
