//! Loader statistics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Counters shared between the coordinator and its handles.
pub type SharedStats = Arc<Mutex<LoaderStats>>;

/// Activity counters of one loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderStats {
    /// Ranged fetches started against the transport
    pub network_fetches: u64,

    /// Download tasks cancelled by a restart or shutdown
    pub tasks_cancelled: u64,

    /// Bytes received from the network by active tasks
    pub bytes_downloaded: u64,

    /// Bytes handed to the decoder
    pub bytes_delivered: u64,

    /// Read requests that received `Finished`
    pub requests_finished: u64,

    /// Read requests that received `Failed`
    pub requests_failed: u64,

    /// Read requests withdrawn by the decoder
    pub requests_cancelled: u64,
}

impl LoaderStats {
    /// Returns true if no byte was ever fetched from the network.
    pub fn served_offline(&self) -> bool {
        self.network_fetches == 0
    }

    /// Read requests that reached a terminal response.
    pub fn requests_completed(&self) -> u64 {
        self.requests_finished + self.requests_failed
    }
}
