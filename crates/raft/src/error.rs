// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the consensus core

use crate::transport::TransportError;
use tern_core::MemberId;
use thiserror::Error;

/// Errors surfaced by the consensus core.
///
/// Internal retries (elections, conflict resolution) never show up here;
/// these are the failures that need external attention.
#[derive(Debug, Error)]
pub enum RaftError {
    #[error("storage error: {0}")]
    Storage(#[from] tern_storage::StorageError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] tern_snapshot::SnapshotError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("not the leader of this partition (leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },
    #[error("index {index} is above the commit index {commit}")]
    NotCommitted { index: u64, commit: u64 },
    #[error("entry at index {0} is no longer in the log")]
    EntryCompacted(u64),
    #[error("consensus actor stopped")]
    Shutdown,
}
