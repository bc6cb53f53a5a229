// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader-side replication and commitment
//!
//! The leader tracks one replicator per peer (next/match index, retry
//! backoff, optional snapshot transfer cursor), appends client entries
//! locally, and advances the commit index once a quorum holds an entry
//! from its own term. Peers that have fallen behind the compaction
//! boundary are caught up with snapshot chunks instead of entries.

use crate::error::RaftError;
use crate::flow::AppendPermit;
use crate::msg::RaftMsg;
use crate::node::{NodeRole, RaftNode};
use crate::transport::RaftTransport;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tern_core::{AppendRequest, InstallRequest, LogEntry, MemberId, Term};
use tern_snapshot::PersistedSnapshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// One client append waiting for quorum commitment
pub(crate) struct PendingAppend {
    pub index: u64,
    pub permit: AppendPermit,
}

/// Snapshot transfer to one lagging peer
pub(crate) struct SnapshotCursor {
    pub snapshot: PersistedSnapshot,
    pub next_chunk: u32,
}

/// Per-peer replication progress
pub(crate) struct Replicator {
    pub next_index: u64,
    pub match_index: u64,
    pub in_flight: bool,
    pub backoff: Duration,
    pub retry_at: Instant,
    pub snapshot: Option<SnapshotCursor>,
}

impl Replicator {
    fn new(next_index: u64, backoff: Duration) -> Self {
        Self {
            next_index,
            match_index: 0,
            in_flight: false,
            backoff,
            retry_at: Instant::now(),
            snapshot: None,
        }
    }
}

/// State carried only while this replica leads its partition
pub(crate) struct LeaderState {
    pub replicators: HashMap<MemberId, Replicator>,
    /// Appends awaiting commitment, in index order
    pub pending: VecDeque<PendingAppend>,
    pub next_heartbeat: Instant,
}

impl LeaderState {
    fn new(
        peers: Vec<MemberId>,
        next_index: u64,
        next_heartbeat: Instant,
        backoff: Duration,
    ) -> Self {
        let replicators = peers
            .into_iter()
            .map(|peer| (peer, Replicator::new(next_index, backoff)))
            .collect();
        Self {
            replicators,
            pending: VecDeque::new(),
            next_heartbeat,
        }
    }

    /// Pop the pending appends committed at or below `commit_index`
    fn take_committed(&mut self, commit_index: u64) -> Vec<(u64, AppendPermit)> {
        let mut committed = Vec::new();
        while let Some(front) = self.pending.front() {
            if front.index > commit_index {
                break;
            }
            if let Some(pending) = self.pending.pop_front() {
                committed.push((pending.index, pending.permit));
            }
        }
        committed
    }

    /// Fail every pending append over its flow-control error channel
    pub(crate) fn fail_pending(mut self, make_error: impl Fn() -> RaftError) {
        for pending in self.pending.drain(..) {
            pending.permit.on_commit_error(pending.index, make_error());
        }
    }
}

impl<T: RaftTransport> RaftNode<T> {
    pub(crate) fn become_leader(&mut self) -> Result<(), RaftError> {
        info!(term = %self.meta.term, "won election, assuming leadership");
        self.leader_id = Some(self.member.clone());
        let state = LeaderState::new(
            self.membership.peers(),
            self.log.last_index() + 1,
            Instant::now() + self.config.heartbeat_interval,
            self.config.replication_backoff,
        );
        self.role = NodeRole::Leader(state);
        self.publish_role();

        // Establish authority right away rather than waiting a tick
        self.broadcast_append()
    }

    pub(crate) fn on_heartbeat_tick(&mut self) -> Result<(), RaftError> {
        let now = Instant::now();
        match &mut self.role {
            NodeRole::Leader(state) if now >= state.next_heartbeat => {
                state.next_heartbeat = now + self.config.heartbeat_interval;
            }
            _ => return Ok(()),
        }
        self.broadcast_append()
    }

    /// Append a client entry locally and replicate it.
    ///
    /// The permit reports the outcome: `on_write_error` if the local
    /// append fails (the partition goes unhealthy), `on_commit` once a
    /// quorum acknowledges, `on_commit_error` if leadership is lost
    /// first.
    pub(crate) async fn handle_client_append(
        &mut self,
        payload: Vec<u8>,
        permit: AppendPermit,
    ) -> Result<(), RaftError> {
        if !matches!(self.role, NodeRole::Leader(_)) {
            permit.on_write_error(RaftError::NotLeader {
                leader: self.leader_id.clone(),
            });
            return Ok(());
        }

        let index = self.log.last_index() + 1;
        let entry = LogEntry::new(index, self.meta.term, payload);
        if let Err(e) = self.log.append(&[entry]) {
            error!(error = %e, index, "local append failed");
            permit.on_write_error(RaftError::Storage(e));
            self.healthy = false;
            self.publish_role();
            return Ok(());
        }

        if let NodeRole::Leader(state) = &mut self.role {
            state.pending.push_back(PendingAppend { index, permit });
        }

        // A single-replica partition commits on its own acknowledgement
        self.try_advance_commit().await?;
        self.broadcast_append()
    }

    pub(crate) fn broadcast_append(&mut self) -> Result<(), RaftError> {
        for peer in self.membership.peers() {
            self.maybe_replicate(&peer)?;
        }
        Ok(())
    }

    /// Send the next batch (entries or a snapshot chunk) to one peer,
    /// unless a request is already in flight or the peer is backing off
    pub(crate) fn maybe_replicate(&mut self, peer: &MemberId) -> Result<(), RaftError> {
        let now = Instant::now();
        let last_index = self.log.last_index();
        let first_index = self.log.first_index();
        let backoff = self.config.replication_backoff;

        let NodeRole::Leader(state) = &mut self.role else {
            return Ok(());
        };
        let replicator = state
            .replicators
            .entry(peer.clone())
            .or_insert_with(|| Replicator::new(last_index + 1, backoff));

        if replicator.in_flight || now < replicator.retry_at {
            return Ok(());
        }

        // A peer behind the compaction boundary needs a snapshot; the
        // entries it is missing no longer exist
        if replicator.snapshot.is_none() {
            let anchor_gone = replicator.next_index < first_index
                || self.log.term_at(replicator.next_index - 1)?.is_none();
            if anchor_gone {
                match self.snapshots.latest()? {
                    Some(snapshot) => {
                        info!(
                            peer = %peer,
                            snapshot = %snapshot.id(),
                            "peer is behind the compaction boundary; sending snapshot"
                        );
                        replicator.snapshot = Some(SnapshotCursor {
                            snapshot,
                            next_chunk: 0,
                        });
                    }
                    None => {
                        debug!(peer = %peer, "peer needs compacted entries but no snapshot exists");
                        return Ok(());
                    }
                }
            }
        }

        if let Some(cursor) = &replicator.snapshot {
            let chunk = match cursor.snapshot.chunk(cursor.next_chunk) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "failed to read snapshot chunk; will retry");
                    replicator.snapshot = None;
                    replicator.retry_at = now + replicator.backoff;
                    return Ok(());
                }
            };
            let request = InstallRequest {
                term: self.meta.term,
                leader: self.member.clone(),
                snapshot_index: chunk.snapshot.index,
                snapshot_term: chunk.snapshot.term,
                chunk_id: chunk.id,
                payload: chunk.payload,
                checksum: chunk.checksum,
                last: chunk.last,
            };
            replicator.in_flight = true;

            let transport = Arc::clone(&self.transport);
            let tx = self.self_tx.clone();
            let to = peer.clone();
            let sent_term = self.meta.term;
            let chunk_id = request.chunk_id;
            tokio::spawn(async move {
                let reply = transport.install(&to, request).await;
                let _ = tx
                    .send(RaftMsg::InstallReply {
                        peer: to,
                        sent_term,
                        chunk_id,
                        reply,
                    })
                    .await;
            });
            return Ok(());
        }

        let prev_index = replicator.next_index - 1;
        let prev_log_term = self.log.term_at(prev_index)?.unwrap_or(Term::ZERO);
        let batch = self.config.max_append_batch.max(1) as u64;
        let to_index = last_index.min(replicator.next_index.saturating_add(batch - 1));
        let entries = if replicator.next_index <= to_index {
            self.log.range(replicator.next_index, to_index)?
        } else {
            Vec::new() // heartbeat
        };
        let sent = entries.len() as u64;
        let request = AppendRequest {
            term: self.meta.term,
            leader: self.member.clone(),
            prev_log_index: prev_index,
            prev_log_term,
            entries,
            commit_index: self.commit_index,
        };
        replicator.in_flight = true;

        let transport = Arc::clone(&self.transport);
        let tx = self.self_tx.clone();
        let to = peer.clone();
        let sent_term = self.meta.term;
        tokio::spawn(async move {
            let reply = transport.append(&to, request).await;
            let _ = tx
                .send(RaftMsg::AppendReply {
                    peer: to,
                    sent_term,
                    prev_index,
                    sent,
                    reply,
                })
                .await;
        });
        Ok(())
    }

    pub(crate) async fn handle_append_reply(
        &mut self,
        peer: MemberId,
        sent_term: Term,
        prev_index: u64,
        sent: u64,
        reply: Result<tern_core::AppendResponse, crate::transport::TransportError>,
    ) -> Result<(), RaftError> {
        if sent_term != self.meta.term {
            return Ok(());
        }

        enum Next {
            Idle,
            Replicate,
            CommitAndReplicate,
            StepDown(Term),
        }

        let next = {
            let NodeRole::Leader(state) = &mut self.role else {
                return Ok(());
            };
            let Some(replicator) = state.replicators.get_mut(&peer) else {
                return Ok(());
            };
            replicator.in_flight = false;

            match reply {
                Err(e) => {
                    debug!(peer = %peer, error = %e, "append to peer failed; backing off");
                    replicator.backoff = (replicator.backoff * 2)
                        .min(self.config.replication_backoff_max);
                    replicator.retry_at = Instant::now() + replicator.backoff;
                    Next::Idle
                }
                Ok(response) => {
                    replicator.backoff = self.config.replication_backoff;
                    replicator.retry_at = Instant::now();

                    if response.term > self.meta.term {
                        Next::StepDown(response.term)
                    } else if response.success {
                        replicator.match_index = replicator.match_index.max(prev_index + sent);
                        replicator.next_index = replicator.match_index + 1;
                        Next::CommitAndReplicate
                    } else {
                        // A follower restored from scratch may hold less
                        // than it once acknowledged; believe its report
                        if response.last_log_index < replicator.match_index {
                            replicator.match_index = response.last_log_index;
                        }
                        // Rewind past the follower's divergent suffix and retry
                        let hint = response.conflict_index.unwrap_or(prev_index);
                        replicator.next_index = hint
                            .min(response.last_log_index + 1)
                            .min(prev_index.max(1))
                            .max(replicator.match_index + 1)
                            .max(1);
                        debug!(
                            peer = %peer,
                            next_index = replicator.next_index,
                            "append rejected; rewinding"
                        );
                        Next::Replicate
                    }
                }
            }
        };

        match next {
            Next::Idle => Ok(()),
            Next::StepDown(term) => self.step_down(term, None),
            Next::Replicate => self.maybe_replicate(&peer),
            Next::CommitAndReplicate => {
                self.try_advance_commit().await?;
                self.maybe_replicate(&peer)
            }
        }
    }

    pub(crate) async fn handle_install_reply(
        &mut self,
        peer: MemberId,
        sent_term: Term,
        chunk_id: u32,
        reply: Result<tern_core::InstallResponse, crate::transport::TransportError>,
    ) -> Result<(), RaftError> {
        if sent_term != self.meta.term {
            return Ok(());
        }

        enum Next {
            Idle,
            Replicate,
            CommitAndReplicate,
            StepDown(Term),
        }

        let next = {
            let NodeRole::Leader(state) = &mut self.role else {
                return Ok(());
            };
            let Some(replicator) = state.replicators.get_mut(&peer) else {
                return Ok(());
            };
            replicator.in_flight = false;

            match reply {
                Err(e) => {
                    debug!(peer = %peer, error = %e, "snapshot chunk send failed; backing off");
                    replicator.backoff = (replicator.backoff * 2)
                        .min(self.config.replication_backoff_max);
                    replicator.retry_at = Instant::now() + replicator.backoff;
                    Next::Idle
                }
                Ok(response) => {
                    replicator.backoff = self.config.replication_backoff;
                    replicator.retry_at = Instant::now();

                    if response.term > self.meta.term {
                        Next::StepDown(response.term)
                    } else if let Some(cursor) = &mut replicator.snapshot {
                        if !response.accepted {
                            // Retransmit from the last acknowledged chunk
                            cursor.next_chunk = response.next_expected_chunk;
                            Next::Replicate
                        } else if chunk_id + 1 >= cursor.snapshot.chunk_count() {
                            // Transfer complete; resume entry replication
                            // just above the snapshot
                            let snapshot_index = cursor.snapshot.index();
                            info!(peer = %peer, snapshot_index, "snapshot transfer complete");
                            replicator.match_index =
                                replicator.match_index.max(snapshot_index);
                            replicator.next_index = snapshot_index + 1;
                            replicator.snapshot = None;
                            Next::CommitAndReplicate
                        } else {
                            cursor.next_chunk = response.next_expected_chunk.max(chunk_id + 1);
                            Next::Replicate
                        }
                    } else {
                        Next::Idle
                    }
                }
            }
        };

        match next {
            Next::Idle => Ok(()),
            Next::StepDown(term) => self.step_down(term, None),
            Next::Replicate => self.maybe_replicate(&peer),
            Next::CommitAndReplicate => {
                self.try_advance_commit().await?;
                self.maybe_replicate(&peer)
            }
        }
    }

    /// Advance the commit index to the highest index a quorum holds,
    /// provided the entry there carries the leader's current term.
    /// Prior-term entries commit only transitively.
    pub(crate) async fn try_advance_commit(&mut self) -> Result<(), RaftError> {
        let quorum = self.membership.quorum();
        let candidate = {
            let NodeRole::Leader(state) = &self.role else {
                return Ok(());
            };
            let mut acked: Vec<u64> = state
                .replicators
                .values()
                .map(|r| r.match_index)
                .collect();
            acked.push(self.log.last_index());
            acked.sort_unstable_by(|a, b| b.cmp(a));
            acked.get(quorum - 1).copied().unwrap_or(0)
        };

        if candidate <= self.commit_index {
            return Ok(());
        }
        if self.log.term_at(candidate)? != Some(self.meta.term) {
            return Ok(());
        }

        self.advance_commit(candidate).await?;

        let committed = {
            let NodeRole::Leader(state) = &mut self.role else {
                return Ok(());
            };
            state.take_committed(self.commit_index)
        };
        for (index, permit) in committed {
            permit.on_commit(index);
        }
        Ok(())
    }

    /// Reconcile replicators with a membership change pushed by the
    /// cluster membership provider. A smaller replica set can shrink the
    /// quorum, so commitment is re-evaluated.
    pub(crate) async fn on_membership_change(&mut self) -> Result<(), RaftError> {
        let members = self.membership.members();
        info!(members = ?members, "membership changed");

        let peers: HashSet<MemberId> = self.membership.peers().into_iter().collect();
        let next_index = self.log.last_index() + 1;
        let backoff = self.config.replication_backoff;
        if let NodeRole::Leader(state) = &mut self.role {
            state.replicators.retain(|member, _| peers.contains(member));
            for peer in peers {
                state
                    .replicators
                    .entry(peer)
                    .or_insert_with(|| Replicator::new(next_index, backoff));
            }
        } else {
            return Ok(());
        }

        self.try_advance_commit().await?;
        self.broadcast_append()
    }
}
