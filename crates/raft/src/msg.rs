// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages flowing through the consensus actor's inbox

use crate::error::RaftError;
use crate::flow::AppendPermit;
use crate::transport::TransportError;
use tern_core::{
    AdminRequest, AdminResponse, AppendRequest, AppendResponse, InstallRequest, InstallResponse,
    LogEntry, MemberId, Term, VoteRequest, VoteResponse,
};
use tern_snapshot::SnapshotId;
use tokio::sync::oneshot;

/// What the partition's state-machine consumer receives, strictly in
/// index order over a single-consumer feed
#[derive(Debug, Clone)]
pub enum CommitEvent {
    /// The next committed entry
    Entry(LogEntry),
    /// State up to `index` was replaced by an installed snapshot; the
    /// consumer restores from it before applying later entries
    SnapshotInstalled { index: u64, term: Term },
}

/// Inbox messages; everything the actor reacts to arrives here
pub(crate) enum RaftMsg {
    /// Inbound RPCs from peers
    Vote(VoteRequest, oneshot::Sender<VoteResponse>),
    Append(AppendRequest, oneshot::Sender<AppendResponse>),
    Install(InstallRequest, oneshot::Sender<InstallResponse>),
    /// Out-of-band administrative operations
    Admin(AdminRequest, oneshot::Sender<AdminResponse>),
    /// A client append that already holds a flow-control permit
    ClientAppend { payload: Vec<u8>, permit: AppendPermit },
    /// Capture committed state into a persisted snapshot and compact
    CreateSnapshot {
        index: u64,
        content: Vec<u8>,
        reply: oneshot::Sender<Result<SnapshotId, RaftError>>,
    },
    Shutdown(oneshot::Sender<()>),

    // Replies to RPCs this replica sent; routed back through the inbox
    // so all state mutation stays on the actor task
    VoteReply {
        from: MemberId,
        sent_term: Term,
        reply: Result<VoteResponse, TransportError>,
    },
    AppendReply {
        peer: MemberId,
        sent_term: Term,
        prev_index: u64,
        sent: u64,
        reply: Result<AppendResponse, TransportError>,
    },
    InstallReply {
        peer: MemberId,
        sent_term: Term,
        chunk_id: u32,
        reply: Result<InstallResponse, TransportError>,
    },
}
