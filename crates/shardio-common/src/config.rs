//! Configuration types for Shardio
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};

/// Configuration for shard snapshot and maintenance behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Peer nodes to fetch snapshots from, tried in order
    pub node_list: Vec<String>,
    /// How long a fetched snapshot is served before rotation (milliseconds)
    pub min_time_to_keep_snapshots_ms: u64,
    /// How long an idle database handle stays open before clean-up closes
    /// it (milliseconds)
    pub min_time_to_keep_db_open_ms: u64,
    /// How long to wait before retrying a failed snapshot fetch
    /// (milliseconds)
    pub snapshot_retry_fetch_interval_ms: u64,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            node_list: Vec::new(),
            min_time_to_keep_snapshots_ms: 10 * 60 * 1000, // 10 minutes
            min_time_to_keep_db_open_ms: 60 * 1000,        // 1 minute
            snapshot_retry_fetch_interval_ms: 60 * 1000,   // 1 minute
        }
    }
}
