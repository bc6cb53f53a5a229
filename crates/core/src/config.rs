// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for a partition's storage, consensus, and snapshotting
//!
//! Values are plain structs assembled at the composition root; there is
//! no file or environment loading here.

use std::time::Duration;

/// Consensus timing, batching, and flow-control configuration
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Lower bound of the randomized election timeout
    pub election_timeout_min: Duration,
    /// Upper bound of the randomized election timeout
    pub election_timeout_max: Duration,
    /// Interval between leader heartbeats
    pub heartbeat_interval: Duration,
    /// Maximum number of entries shipped in one append request
    pub max_append_batch: usize,
    /// Initial backoff before retrying a failed replication RPC
    pub replication_backoff: Duration,
    /// Ceiling for the replication retry backoff
    pub replication_backoff_max: Duration,
    /// Number of appends allowed in flight between submit and commit
    pub append_capacity: usize,
    /// Capacity of the consensus actor's inbox
    pub inbox_capacity: usize,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(250),
            election_timeout_max: Duration::from_millis(500),
            heartbeat_interval: Duration::from_millis(50),
            max_append_batch: 64,
            replication_backoff: Duration::from_millis(10),
            replication_backoff_max: Duration::from_secs(1),
            append_capacity: 256,
            inbox_capacity: 128,
        }
    }
}

/// Segmented log storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Size at which the active segment is rolled over, in bytes
    pub segment_capacity: u64,
    /// Every Nth entry is sampled into the in-memory position index
    pub index_interval: u64,
    /// Fsync the active segment after every append batch
    pub sync_on_append: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            segment_capacity: 4 * 1024 * 1024,
            index_interval: 16,
            sync_on_append: true,
        }
    }
}

/// Snapshot creation and retention configuration
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Size of one transfer chunk, in bytes
    pub chunk_size: usize,
    /// Number of committed entries between automatic snapshots
    pub commit_interval: u64,
    /// Number of old snapshots to keep after a new one persists
    pub keep_snapshots: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            commit_interval: 1000,
            keep_snapshots: 2,
        }
    }
}

/// Everything a single partition needs, minus its wiring
#[derive(Debug, Clone, Default)]
pub struct PartitionConfig {
    pub raft: RaftConfig,
    pub storage: StorageConfig,
    pub snapshot: SnapshotConfig,
}
