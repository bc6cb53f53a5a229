// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire messages exchanged between partition replicas
//!
//! The exact encoding is left to the transport; these types fix the
//! fields every encoding must preserve.

use crate::entry::LogEntry;
use crate::id::{MemberId, PartitionId};
use crate::term::Term;
use serde::{Deserialize, Serialize};

/// Request for a vote in a leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Candidate's term (already incremented for this election)
    pub term: Term,
    /// Member requesting the vote
    pub candidate: MemberId,
    /// Index of the candidate's last log entry
    pub last_log_index: u64,
    /// Term of the candidate's last log entry
    pub last_log_term: Term,
}

/// Response to a [`VoteRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    /// Responder's current term, for the candidate to adopt if higher
    pub term: Term,
    pub granted: bool,
}

/// Entries replicated from the leader, with the consistency check anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRequest {
    pub term: Term,
    pub leader: MemberId,
    /// Index of the entry immediately preceding `entries`
    pub prev_log_index: u64,
    /// Term of the entry at `prev_log_index`
    pub prev_log_term: Term,
    /// Batch of entries to append; empty for a heartbeat
    pub entries: Vec<LogEntry>,
    /// Leader's commit index
    pub commit_index: u64,
}

/// Response to an [`AppendRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {
    pub term: Term,
    pub success: bool,
    /// On failure, the index from which the leader should retry
    pub conflict_index: Option<u64>,
    /// On failure, the term of the follower's conflicting entry, if any
    pub conflict_term: Option<Term>,
    /// Highest index the follower holds after this request
    pub last_log_index: u64,
}

/// One chunk of a snapshot transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    pub term: Term,
    pub leader: MemberId,
    /// Index covered by the snapshot being transferred
    pub snapshot_index: u64,
    /// Term of the entry at `snapshot_index`
    pub snapshot_term: Term,
    /// Zero-based position of this chunk in the transfer
    pub chunk_id: u32,
    pub payload: Vec<u8>,
    /// CRC32 of the chunk payload
    pub checksum: u32,
    /// True when this is the final chunk of the snapshot
    pub last: bool,
}

/// Response to an [`InstallRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResponse {
    pub term: Term,
    pub accepted: bool,
    /// Chunk the receiver expects next; the sender retransmits from here
    pub next_expected_chunk: u32,
}

/// Out-of-band administrative operations on a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminRequestKind {
    /// Relinquish leadership and rejoin as a follower
    StepDown,
}

/// Administrative request, handled without disrupting replication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRequest {
    pub partition: PartitionId,
    pub kind: AdminRequestKind,
}

/// Acknowledgement or rejection of an [`AdminRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub accepted: bool,
}
