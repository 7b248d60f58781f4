//! Ranged HTTP Fetch Abstraction
//!
//! Provides the single network capability the loader needs: start a GET at a
//! byte offset and consume the rest of the resource as a cancellable stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::error::Result;

/// Stream of body chunks. Dropping it cancels the underlying network operation.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Open-ended range request: `bytes=<offset>-`.
#[derive(Debug, Clone)]
pub struct RangeRequest {
    pub url: String,
    pub offset: u64,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl RangeRequest {
    pub fn new(url: impl Into<String>, offset: u64) -> Self {
        Self {
            url: url.into(),
            offset,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Value of the `Range` header for this request.
    pub fn range_header(&self) -> String {
        format!("bytes={}-", self.offset)
    }
}

/// Response to a [`RangeRequest`]. The body yields bytes starting at the requested offset.
pub struct RangeResponse {
    pub status: u16,
    /// Size of the whole resource, when the server declared it.
    pub total_length: Option<u64>,
    pub content_type: Option<String>,
    pub accepts_ranges: bool,
    pub body: ByteStream,
}

impl RangeResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self {
            status,
            total_length: None,
            content_type: None,
            accepts_ranges: false,
            body,
        }
    }

    pub fn with_total_length(mut self, total: Option<u64>) -> Self {
        self.total_length = total;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_accepts_ranges(mut self, accepts: bool) -> Self {
        self.accepts_ranges = accepts;
        self
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the server answered with partial content.
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }
}

impl fmt::Debug for RangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeResponse")
            .field("status", &self.status)
            .field("total_length", &self.total_length)
            .field("content_type", &self.content_type)
            .field("accepts_ranges", &self.accepts_ranges)
            .finish_non_exhaustive()
    }
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` when the server sent `*` as the complete length.
    pub total: Option<u64>,
}

/// Parse a `Content-Range` header value. Unsatisfied ranges (`bytes */1000`) yield `None`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Async ranged fetch trait
///
/// Implementations start a GET at `request.offset` and return as soon as the
/// response headers are known; the body is consumed lazily.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{RangeFetcher, RangeRequest};
/// use futures::StreamExt;
///
/// async fn tail(fetcher: &dyn RangeFetcher, url: &str) -> Result<u64> {
///     let mut response = fetcher.fetch(RangeRequest::new(url, 1024)).await?;
///     let mut received = 0;
///     while let Some(chunk) = response.body.next().await {
///         received += chunk?.len() as u64;
///     }
///     Ok(received)
/// }
/// ```
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Start a ranged fetch.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - The server rejects the range or answers with a non-success status
    /// - The server ignores the range for a non-zero offset
    async fn fetch(&self, request: RangeRequest) -> Result<RangeResponse>;
}
