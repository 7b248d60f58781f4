//! Read request types exchanged with the decoder

use crate::error::LoaderError;
use crate::task::TaskId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle of one decoder read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Outbound signal for a read request.
///
/// A request receives any number of `Data` responses followed by exactly one
/// `Finished` or `Failed`, unless the decoder cancelled it first.
#[derive(Debug, Clone)]
pub enum LoaderResponse {
    /// Next contiguous slice of the requested range.
    Data { request: RequestId, bytes: Bytes },
    /// Every requested byte has been delivered.
    Finished { request: RequestId },
    /// The request cannot be satisfied.
    Failed {
        request: RequestId,
        error: LoaderError,
    },
}

impl LoaderResponse {
    pub fn request(&self) -> RequestId {
        match self {
            LoaderResponse::Data { request, .. }
            | LoaderResponse::Finished { request }
            | LoaderResponse::Failed { request, .. } => *request,
        }
    }

    /// Returns true for `Finished` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoaderResponse::Data { .. })
    }
}

/// Content metadata answered to the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub content_type: String,
    pub content_length: u64,
    pub byte_range_access: bool,
}

/// A read request awaiting data.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub id: RequestId,
    pub offset: u64,
    pub length: u64,
    /// Next byte to deliver
    pub current_offset: u64,
    /// Download task this request waits on, if any
    pub task: Option<TaskId>,
}

impl PendingRequest {
    pub fn new(id: RequestId, offset: u64, length: u64) -> Self {
        Self {
            id,
            offset,
            length,
            current_offset: offset,
            task: None,
        }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn remaining(&self) -> u64 {
        self.end().saturating_sub(self.current_offset)
    }
}
