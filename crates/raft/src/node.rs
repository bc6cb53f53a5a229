// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-partition consensus actor
//!
//! One task drains a bounded inbox; every mutation of term, role, and
//! commit index happens on that task, which is what preserves the
//! single-writer invariant without locks. Replies to RPCs this replica
//! sends are routed back through the same inbox.
//!
//! Role transitions follow the usual shape: followers time out into
//! candidates, candidates win elections into leaders, and any role falls
//! back to follower on observing a higher term.

use crate::error::RaftError;
use crate::flow::AppendPipeline;
use crate::handle::RaftHandle;
use crate::leader::LeaderState;
use crate::membership::Membership;
use crate::msg::{CommitEvent, RaftMsg};
use crate::role::{Role, RoleReport};
use crate::transport::RaftTransport;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tern_core::{
    AdminRequest, AdminRequestKind, AdminResponse, AppendRequest, AppendResponse, InstallRequest,
    InstallResponse, MemberId, PartitionConfig, PartitionId, RaftConfig, SnapshotConfig, Term,
    VoteRequest, VoteResponse,
};
use tern_snapshot::{ReceivedSnapshot, SnapshotChunk, SnapshotId, SnapshotStore};
use tern_storage::{MetaStore, RaftMetadata, SegmentedLog};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Everything a consensus actor is wired with at the composition root
pub struct RaftDeps<T> {
    pub member: MemberId,
    pub partition: PartitionId,
    pub membership: Membership,
    pub transport: Arc<T>,
    pub log: SegmentedLog,
    pub meta: MetaStore,
    pub snapshots: SnapshotStore,
    /// Single-consumer feed of committed entries, in index order
    pub commits: mpsc::Sender<CommitEvent>,
}

/// Role-specific state carried by the actor
pub(crate) enum NodeRole {
    Follower,
    Candidate { votes: HashSet<MemberId> },
    Leader(LeaderState),
}

impl NodeRole {
    fn kind(&self) -> Role {
        match self {
            NodeRole::Follower => Role::Follower,
            NodeRole::Candidate { .. } => Role::Candidate,
            NodeRole::Leader(_) => Role::Leader,
        }
    }
}

/// The consensus actor for one partition
pub struct RaftNode<T: RaftTransport> {
    pub(crate) member: MemberId,
    pub(crate) partition: PartitionId,
    pub(crate) config: RaftConfig,
    pub(crate) snapshot_config: SnapshotConfig,
    pub(crate) membership: Membership,
    pub(crate) transport: Arc<T>,
    pub(crate) log: SegmentedLog,
    pub(crate) meta_store: MetaStore,
    pub(crate) meta: RaftMetadata,
    pub(crate) snapshots: SnapshotStore,
    pub(crate) commits: mpsc::Sender<CommitEvent>,
    pub(crate) commit_index: u64,
    pub(crate) delivered: u64,
    pub(crate) leader_id: Option<MemberId>,
    pub(crate) role: NodeRole,
    pub(crate) election_deadline: Instant,
    pub(crate) role_tx: watch::Sender<RoleReport>,
    pub(crate) healthy: bool,
    pub(crate) inbox: mpsc::Receiver<RaftMsg>,
    pub(crate) self_tx: mpsc::Sender<RaftMsg>,
    /// Snapshot transfer in progress on this (receiving) replica
    pub(crate) receiving: Option<ReceivedSnapshot>,
}

impl<T: RaftTransport> RaftNode<T> {
    /// Build the actor and its handle without starting it
    pub fn new(
        config: PartitionConfig,
        deps: RaftDeps<T>,
    ) -> Result<(Self, RaftHandle), RaftError> {
        let meta = deps.meta.load()?;
        let (baseline_index, _) = deps.log.baseline();

        let (inbox_tx, inbox_rx) = mpsc::channel(config.raft.inbox_capacity);
        let pipeline = AppendPipeline::new(config.raft.append_capacity);
        let (role_tx, role_rx) = watch::channel(RoleReport {
            role: Role::Follower,
            term: meta.term,
            leader: None,
            commit_index: baseline_index,
            healthy: true,
        });

        let mut node = Self {
            member: deps.member,
            partition: deps.partition,
            config: config.raft,
            snapshot_config: config.snapshot,
            membership: deps.membership,
            transport: deps.transport,
            log: deps.log,
            meta_store: deps.meta,
            meta,
            snapshots: deps.snapshots,
            commits: deps.commits,
            commit_index: baseline_index,
            delivered: baseline_index,
            leader_id: None,
            role: NodeRole::Follower,
            election_deadline: Instant::now(),
            role_tx,
            healthy: true,
            inbox: inbox_rx,
            self_tx: inbox_tx.clone(),
            receiving: None,
        };
        node.reset_election_deadline();

        let handle = RaftHandle {
            tx: inbox_tx,
            pipeline,
            role_rx,
        };
        Ok((node, handle))
    }

    /// Build the actor and run it on its own task
    pub fn spawn(
        config: PartitionConfig,
        deps: RaftDeps<T>,
    ) -> Result<(RaftHandle, JoinHandle<()>), RaftError> {
        let (node, handle) = Self::new(config, deps)?;
        let task = tokio::spawn(node.run());
        Ok((handle, task))
    }

    /// Drive the partition until shutdown
    pub async fn run(mut self) {
        info!(
            member = %self.member,
            partition = %self.partition,
            term = %self.meta.term,
            last_index = self.log.last_index(),
            "consensus actor started"
        );
        self.publish_role();

        loop {
            let wake = self.next_wakeup();
            tokio::select! {
                maybe = self.inbox.recv() => match maybe {
                    Some(RaftMsg::Shutdown(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        return;
                    }
                    Some(msg) => self.dispatch(msg).await,
                    // All handles gone; nothing can reach the partition anymore
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                _ = time::sleep_until(wake) => {
                    if let Err(e) = self.on_timer().await {
                        self.on_error(e);
                    }
                }
                _ = self.membership.changed() => {
                    if let Err(e) = self.on_membership_change().await {
                        self.on_error(e);
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, msg: RaftMsg) {
        let result = match msg {
            RaftMsg::Vote(request, reply) => self.handle_vote(request).map(|resp| {
                let _ = reply.send(resp);
            }),
            RaftMsg::Append(request, reply) => {
                self.handle_append(request).await.map(|resp| {
                    let _ = reply.send(resp);
                })
            }
            RaftMsg::Install(request, reply) => {
                self.handle_install(request).await.map(|resp| {
                    let _ = reply.send(resp);
                })
            }
            RaftMsg::Admin(request, reply) => {
                let resp = self.handle_admin(request);
                let _ = reply.send(resp);
                Ok(())
            }
            RaftMsg::ClientAppend { payload, permit } => {
                self.handle_client_append(payload, permit).await
            }
            RaftMsg::CreateSnapshot {
                index,
                content,
                reply,
            } => {
                let _ = reply.send(self.handle_create_snapshot(index, content));
                Ok(())
            }
            RaftMsg::VoteReply {
                from,
                sent_term,
                reply,
            } => self.handle_vote_reply(from, sent_term, reply),
            RaftMsg::AppendReply {
                peer,
                sent_term,
                prev_index,
                sent,
                reply,
            } => {
                self.handle_append_reply(peer, sent_term, prev_index, sent, reply)
                    .await
            }
            RaftMsg::InstallReply {
                peer,
                sent_term,
                chunk_id,
                reply,
            } => {
                self.handle_install_reply(peer, sent_term, chunk_id, reply)
                    .await
            }
            RaftMsg::Shutdown(_) => Ok(()), // handled in run()
        };

        if let Err(e) = result {
            self.on_error(e);
        }
    }

    // === Timers ===

    fn next_wakeup(&self) -> Instant {
        match &self.role {
            NodeRole::Leader(state) => state.next_heartbeat,
            _ => self.election_deadline,
        }
    }

    async fn on_timer(&mut self) -> Result<(), RaftError> {
        match &self.role {
            NodeRole::Leader(_) => self.on_heartbeat_tick()?,
            _ => {
                if Instant::now() >= self.election_deadline {
                    self.start_election()?;
                }
            }
        }
        Ok(())
    }

    /// Randomized per replica so concurrent timeouts rarely collide
    pub(crate) fn reset_election_deadline(&mut self) {
        let min = self.config.election_timeout_min;
        let max = self.config.election_timeout_max;
        let timeout = if max > min {
            let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
            Duration::from_millis(ms)
        } else {
            min
        };
        self.election_deadline = Instant::now() + timeout;
    }

    // === Elections ===

    fn start_election(&mut self) -> Result<(), RaftError> {
        // Vote for ourselves durably before asking anyone else
        self.meta.term = self.meta.term.next();
        self.meta.voted_for = Some(self.member.clone());
        self.meta_store.store(&self.meta)?;

        self.leader_id = None;
        let mut votes = HashSet::new();
        votes.insert(self.member.clone());
        self.role = NodeRole::Candidate { votes };
        debug!(term = %self.meta.term, "election timeout, requesting votes");
        self.publish_role();
        self.reset_election_deadline();

        let request = VoteRequest {
            term: self.meta.term,
            candidate: self.member.clone(),
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };
        for peer in self.membership.peers() {
            let transport = Arc::clone(&self.transport);
            let tx = self.self_tx.clone();
            let request = request.clone();
            let sent_term = self.meta.term;
            tokio::spawn(async move {
                let reply = transport.vote(&peer, request).await;
                let _ = tx
                    .send(RaftMsg::VoteReply {
                        from: peer,
                        sent_term,
                        reply,
                    })
                    .await;
            });
        }

        // A single-replica partition wins immediately
        self.check_votes()
    }

    fn handle_vote_reply(
        &mut self,
        from: MemberId,
        sent_term: Term,
        reply: Result<VoteResponse, crate::transport::TransportError>,
    ) -> Result<(), RaftError> {
        if sent_term != self.meta.term {
            return Ok(()); // stale election
        }
        let response = match reply {
            Ok(r) => r,
            Err(e) => {
                // No quorum in time simply retries at the next timeout
                debug!(peer = %from, error = %e, "vote request failed");
                return Ok(());
            }
        };

        if response.term > self.meta.term {
            return self.step_down(response.term, None);
        }
        if let NodeRole::Candidate { votes } = &mut self.role {
            if response.granted {
                votes.insert(from);
            }
        }
        self.check_votes()
    }

    fn check_votes(&mut self) -> Result<(), RaftError> {
        let won = match &self.role {
            NodeRole::Candidate { votes } => votes.len() >= self.membership.quorum(),
            _ => false,
        };
        if won {
            self.become_leader()?;
        }
        Ok(())
    }

    /// A peer grants its vote at most once per term, and only to a
    /// candidate whose log is at least as up to date as its own
    fn handle_vote(&mut self, request: VoteRequest) -> Result<VoteResponse, RaftError> {
        if request.term < self.meta.term {
            return Ok(VoteResponse {
                term: self.meta.term,
                granted: false,
            });
        }
        if request.term > self.meta.term {
            self.step_down(request.term, None)?;
        }

        let ours = (self.log.last_term(), self.log.last_index());
        let theirs = (request.last_log_term, request.last_log_index);
        let up_to_date = theirs >= ours;
        let free_to_vote = match &self.meta.voted_for {
            None => true,
            Some(candidate) => *candidate == request.candidate,
        };

        let granted = up_to_date && free_to_vote;
        if granted {
            if self.meta.voted_for.is_none() {
                self.meta.voted_for = Some(request.candidate.clone());
                self.meta_store.store(&self.meta)?;
            }
            self.reset_election_deadline();
        }
        debug!(
            candidate = %request.candidate,
            term = %request.term,
            granted,
            "vote request"
        );
        Ok(VoteResponse {
            term: self.meta.term,
            granted,
        })
    }

    // === Append handling (follower side) ===

    async fn handle_append(
        &mut self,
        request: AppendRequest,
    ) -> Result<AppendResponse, RaftError> {
        if request.term < self.meta.term {
            return Ok(self.reject_append(None, None));
        }
        if request.term > self.meta.term || !matches!(self.role, NodeRole::Follower) {
            self.step_down(request.term, Some(request.leader.clone()))?;
        }
        self.leader_id = Some(request.leader.clone());
        self.reset_election_deadline();

        // Consistency check against the entry preceding the batch
        if request.prev_log_index > 0 {
            match self.log.term_at(request.prev_log_index)? {
                None => {
                    // Our log is shorter than the leader thinks
                    let conflict = self.log.last_index() + 1;
                    return Ok(self.reject_append(Some(conflict), None));
                }
                Some(term) if term != request.prev_log_term => {
                    // Walk back to the first entry of the conflicting term
                    // so the leader can skip the whole run
                    let conflict = self.first_index_of_term(request.prev_log_index, term)?;
                    return Ok(self.reject_append(Some(conflict), Some(term)));
                }
                Some(_) => {}
            }
        }

        // Skip entries we already hold; truncate at the first divergence
        let mut first_new = None;
        for (n, entry) in request.entries.iter().enumerate() {
            match self.log.term_at(entry.index)? {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    self.log.truncate_from(entry.index)?;
                    first_new = Some(n);
                    break;
                }
                None => {
                    first_new = Some(n);
                    break;
                }
            }
        }
        if let Some(n) = first_new {
            self.log.append(&request.entries[n..])?;
        }

        let new_commit = request.commit_index.min(self.log.last_index());
        if new_commit > self.commit_index {
            self.advance_commit(new_commit).await?;
        }

        Ok(AppendResponse {
            term: self.meta.term,
            success: true,
            conflict_index: None,
            conflict_term: None,
            last_log_index: self.log.last_index(),
        })
    }

    fn reject_append(
        &self,
        conflict_index: Option<u64>,
        conflict_term: Option<Term>,
    ) -> AppendResponse {
        AppendResponse {
            term: self.meta.term,
            success: false,
            conflict_index,
            conflict_term,
            last_log_index: self.log.last_index(),
        }
    }

    fn first_index_of_term(&self, from: u64, term: Term) -> Result<u64, RaftError> {
        let mut index = from;
        while index > self.log.first_index() {
            match self.log.term_at(index - 1)? {
                Some(t) if t == term => index -= 1,
                _ => break,
            }
        }
        Ok(index)
    }

    // === Snapshot install (receiving side) ===

    async fn handle_install(
        &mut self,
        request: InstallRequest,
    ) -> Result<InstallResponse, RaftError> {
        if request.term < self.meta.term {
            return Ok(InstallResponse {
                term: self.meta.term,
                accepted: false,
                next_expected_chunk: 0,
            });
        }
        if request.term > self.meta.term || !matches!(self.role, NodeRole::Follower) {
            self.step_down(request.term, Some(request.leader.clone()))?;
        }
        self.leader_id = Some(request.leader.clone());
        self.reset_election_deadline();

        let id = SnapshotId::new(request.snapshot_index, request.snapshot_term);

        // Already covered by local state (a persisted snapshot or the
        // committed log): acknowledge the chunk so the sender walks its
        // transfer to completion without installing anything
        let covered = id.index <= self.commit_index
            || self
                .snapshots
                .latest()?
                .map(|latest| latest.index() >= id.index)
                .unwrap_or(false);
        if covered {
            return Ok(InstallResponse {
                term: self.meta.term,
                accepted: true,
                next_expected_chunk: request.chunk_id + 1,
            });
        }

        let mut receiving = match self.receiving.take() {
            Some(receiving) if receiving.id() == id => receiving,
            Some(receiving) => {
                // The leader moved on to a newer snapshot; drop the old
                // transfer before starting over
                if request.chunk_id == 0 {
                    if let Err(e) = receiving.abort() {
                        warn!(error = %e, "failed to abort superseded snapshot transfer");
                    }
                    self.snapshots.new_received(id)?
                } else {
                    self.receiving = Some(receiving);
                    return Ok(InstallResponse {
                        term: self.meta.term,
                        accepted: false,
                        next_expected_chunk: 0,
                    });
                }
            }
            None => {
                if request.chunk_id != 0 {
                    return Ok(InstallResponse {
                        term: self.meta.term,
                        accepted: false,
                        next_expected_chunk: 0,
                    });
                }
                self.snapshots.new_received(id)?
            }
        };

        let chunk = SnapshotChunk {
            snapshot: id,
            id: request.chunk_id,
            payload: request.payload,
            checksum: request.checksum,
            last: request.last,
        };

        if let Err(e) = receiving.apply(&chunk) {
            let next = receiving.next_expected();
            warn!(snapshot = %id, chunk = chunk.id, error = %e, "rejected snapshot chunk");
            self.receiving = Some(receiving);
            return Ok(InstallResponse {
                term: self.meta.term,
                accepted: false,
                next_expected_chunk: next,
            });
        }

        let next = receiving.next_expected();
        if receiving.is_complete() {
            // Reset the log before persisting: crashing in between must
            // not leave a persisted snapshot beside a conflicting log
            self.log.reset(id.index, id.term)?;
            let persisted = receiving.persist()?;
            info!(snapshot = %id, "installed snapshot from leader");

            self.commit_index = self.commit_index.max(id.index);
            self.delivered = self.delivered.max(id.index);
            self.publish_role();
            if self
                .commits
                .send(CommitEvent::SnapshotInstalled {
                    index: id.index,
                    term: id.term,
                })
                .await
                .is_err()
            {
                warn!("commit feed closed; state machine consumer is gone");
                self.healthy = false;
                self.publish_role();
            }

            self.snapshots
                .purge_older_than(persisted.index(), self.snapshot_config.keep_snapshots)?;
        } else {
            self.receiving = Some(receiving);
        }

        Ok(InstallResponse {
            term: self.meta.term,
            accepted: true,
            next_expected_chunk: next,
        })
    }

    // === Snapshot creation (local state) ===

    fn handle_create_snapshot(
        &mut self,
        index: u64,
        content: Vec<u8>,
    ) -> Result<SnapshotId, RaftError> {
        if index > self.commit_index {
            return Err(RaftError::NotCommitted {
                index,
                commit: self.commit_index,
            });
        }
        if let Some(latest) = self.snapshots.latest()? {
            if latest.index() >= index {
                return Ok(latest.id());
            }
        }
        let term = self
            .log
            .term_at(index)?
            .ok_or(RaftError::EntryCompacted(index))?;

        let id = SnapshotId::new(index, term);
        let mut pending = self.snapshots.new_pending(id)?;
        pending.write_all(&content, self.snapshot_config.chunk_size)?;
        let persisted = pending.persist()?;

        self.log.compact_below(persisted.index(), persisted.term())?;
        self.snapshots
            .purge_older_than(persisted.index(), self.snapshot_config.keep_snapshots)?;
        info!(snapshot = %id, "took snapshot and compacted log");
        Ok(id)
    }

    // === Administration ===

    fn handle_admin(&mut self, request: AdminRequest) -> AdminResponse {
        if request.partition != self.partition {
            return AdminResponse { accepted: false };
        }
        match request.kind {
            AdminRequestKind::StepDown => {
                if matches!(self.role, NodeRole::Leader(_)) {
                    info!("stepping down on admin request");
                    if let Err(e) = self.step_down(self.meta.term, None) {
                        self.on_error(e);
                        return AdminResponse { accepted: false };
                    }
                    AdminResponse { accepted: true }
                } else {
                    AdminResponse { accepted: false }
                }
            }
        }
    }

    // === Shared state transitions ===

    /// Fall back to follower, adopting `term` if it is newer.
    ///
    /// Cancels any in-progress election or leadership duties; pending
    /// appends fail over the flow-control error channel.
    pub(crate) fn step_down(
        &mut self,
        term: Term,
        leader: Option<MemberId>,
    ) -> Result<(), RaftError> {
        if term > self.meta.term {
            self.meta.term = term;
            self.meta.voted_for = None;
            self.meta_store.store(&self.meta)?;
        }

        let previous = std::mem::replace(&mut self.role, NodeRole::Follower);
        if let NodeRole::Leader(state) = previous {
            debug!(term = %self.meta.term, "relinquishing leadership");
            state.fail_pending(|| RaftError::NotLeader {
                leader: leader.clone(),
            });
        }
        self.leader_id = leader;
        self.reset_election_deadline();
        self.publish_role();
        Ok(())
    }

    /// Advance the commit index and feed newly committed entries, in
    /// order, to the state machine consumer
    pub(crate) async fn advance_commit(&mut self, index: u64) -> Result<(), RaftError> {
        debug_assert!(index >= self.commit_index, "commit index must not move backwards");
        self.commit_index = index;
        self.log.set_commit_floor(index);
        self.publish_role();

        while self.delivered < self.commit_index {
            let next = self.delivered + 1;
            let entry = self
                .log
                .entry(next)?
                .ok_or(RaftError::EntryCompacted(next))?;
            if self.commits.send(CommitEvent::Entry(entry)).await.is_err() {
                warn!("commit feed closed; state machine consumer is gone");
                self.healthy = false;
                self.publish_role();
                break;
            }
            self.delivered = next;
        }
        Ok(())
    }

    pub(crate) fn publish_role(&self) {
        self.role_tx.send_replace(RoleReport {
            role: self.role.kind(),
            term: self.meta.term,
            leader: self.leader_id.clone(),
            commit_index: self.commit_index,
            healthy: self.healthy,
        });
    }

    /// A failure that needs external attention: log it and mark the
    /// partition unhealthy so operators can restart or recover it
    fn on_error(&mut self, error: RaftError) {
        error!(error = %error, "consensus actor failure");
        self.healthy = false;
        self.publish_role();
    }

    /// Release resources in order: leadership first, then log storage,
    /// then any half-received snapshot. Each step tolerates failure of
    /// the previous one.
    fn shutdown(&mut self) {
        info!(member = %self.member, partition = %self.partition, "consensus actor stopping");

        let previous = std::mem::replace(&mut self.role, NodeRole::Follower);
        if let NodeRole::Leader(state) = previous {
            state.fail_pending(|| RaftError::Shutdown);
        }

        if let Err(e) = self.log.flush() {
            warn!(error = %e, "failed to flush log during shutdown");
        }

        if let Some(receiving) = self.receiving.take() {
            if let Err(e) = receiving.abort() {
                warn!(error = %e, "failed to abort snapshot transfer during shutdown");
            }
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
