//! Ranged fetch implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{parse_content_range, RangeFetcher, RangeRequest, RangeResponse},
};
use futures_util::TryStreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based ranged fetcher
///
/// Provides:
/// - Connection pooling via reqwest
/// - `Range: bytes=N-` requests with `206`/`200`/`416` interpretation
/// - Streaming bodies (dropping the stream aborts the transfer)
///
/// No retry is attempted; a failed fetch is reported to the caller as is.
pub struct ReqwestRangeFetcher {
    client: Client,
}

/// Headers of a ranged response, validated against the requested offset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResponseHead {
    total_length: Option<u64>,
    content_type: Option<String>,
    accepts_ranges: bool,
}

impl ReqwestRangeFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new fetcher with a custom connect/read timeout
    ///
    /// The timeout bounds connection setup and each read, not the whole
    /// transfer, since media bodies can stream for a long time.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("rangecache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a new fetcher with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: &RangeRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(&request.url)
            .header(RANGE, request.range_header());

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn interpret(offset: u64, status: StatusCode, headers: &HeaderMap) -> Result<ResponseHead> {
        let content_type = header_str(headers, CONTENT_TYPE).map(str::to_string);
        let content_length =
            header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse::<u64>().ok());
        let accepts_ranges = header_str(headers, ACCEPT_RANGES)
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let range = header_str(headers, CONTENT_RANGE).and_then(parse_content_range);
                if let Some(range) = range {
                    if range.start != offset {
                        return Err(BridgeError::OperationFailed(format!(
                            "Server returned range starting at {} for offset {}",
                            range.start, offset
                        )));
                    }
                }
                Ok(ResponseHead {
                    total_length: range.and_then(|r| r.total),
                    content_type,
                    accepts_ranges: true,
                })
            }
            StatusCode::OK if offset == 0 => Ok(ResponseHead {
                total_length: content_length,
                content_type,
                accepts_ranges,
            }),
            StatusCode::OK => Err(BridgeError::OperationFailed(format!(
                "Server ignored range request for offset {}",
                offset
            ))),
            StatusCode::RANGE_NOT_SATISFIABLE => Err(BridgeError::RangeNotSatisfiable { offset }),
            other => Err(BridgeError::HttpStatus {
                status: other.as_u16(),
                message: other.canonical_reason().unwrap_or("unexpected status").to_string(),
            }),
        }
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl RangeFetcher for ReqwestRangeFetcher {
    async fn fetch(&self, request: RangeRequest) -> Result<RangeResponse> {
        debug!(url = %request.url, offset = request.offset, "Starting ranged fetch");

        let response = self.build_request(&request).send().await.map_err(|e| {
            warn!(error = %e, url = %request.url, "Ranged fetch failed");
            if e.is_timeout() {
                BridgeError::OperationFailed("Request timed out".to_string())
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let head = Self::interpret(request.offset, status, response.headers())?;
        debug!(
            status = status.as_u16(),
            total_length = ?head.total_length,
            "Ranged fetch responded"
        );

        let body = response
            .bytes_stream()
            .map_err(|e| BridgeError::OperationFailed(e.to_string()));

        Ok(RangeResponse::new(status.as_u16(), Box::pin(body))
            .with_total_length(head.total_length)
            .with_content_type(head.content_type)
            .with_accepts_ranges(head.accepts_ranges))
    }
}
