// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembling and running one partition
//!
//! `bootstrap` wires log storage, the snapshot store, and the consensus
//! actor together and returns a future immediately; every fallible step,
//! including configuration resolution, runs inside that future. `stop`
//! winds the partition down in order: snapshot scheduling, then the
//! consensus actor (which closes storage and releases any half-received
//! snapshot), each step tolerant of failures in the previous one.

use crate::config::ConfigProvider;
use crate::error::BootstrapError;
use crate::snapshotter::SnapshotDriver;
use crate::state_machine::SnapshotSource;
use std::future::Future;
use std::sync::Arc;
use tern_core::{AdminRequest, AdminRequestKind, AdminResponse, MemberId, PartitionId};
use tern_raft::{
    CommitEvent, Membership, MembershipWriter, RaftDeps, RaftError, RaftHandle, RaftNode,
    RaftTransport, RoleReport,
};
use tern_snapshot::SnapshotStore;
use tern_storage::{MetaStore, SegmentedLog};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Capacity of the committed-entry feed to the state machine consumer
const COMMIT_FEED_CAPACITY: usize = 256;

/// Everything a partition needs from its surroundings
pub struct PartitionDeps<T, P> {
    pub member: MemberId,
    pub partition: PartitionId,
    /// Initial replica set, as supplied by the cluster membership provider
    pub members: Vec<MemberId>,
    pub transport: Arc<T>,
    pub provider: P,
    /// Supplies snapshot content; `None` disables automatic snapshotting
    pub snapshot_source: Option<Arc<dyn SnapshotSource>>,
}

/// One running partition: an independent consensus group with its own
/// log, snapshots, and lifecycle
#[derive(Debug)]
pub struct Partition {
    partition: PartitionId,
    member: MemberId,
    handle: RaftHandle,
    actor: JoinHandle<()>,
    snapshotter: Option<JoinHandle<()>>,
    commit_rx: Option<mpsc::Receiver<CommitEvent>>,
    membership: MembershipWriter,
}

impl Partition {
    /// Start a partition asynchronously.
    ///
    /// Returns a future immediately and never fails synchronously: any
    /// failure, including the configuration provider refusing to answer,
    /// completes the returned future with the original cause.
    pub fn bootstrap<T, P>(
        deps: PartitionDeps<T, P>,
    ) -> impl Future<Output = Result<Partition, BootstrapError>>
    where
        T: RaftTransport,
        P: ConfigProvider + 'static,
    {
        async move { Self::bootstrap_inner(deps).await }
    }

    async fn bootstrap_inner<T, P>(deps: PartitionDeps<T, P>) -> Result<Self, BootstrapError>
    where
        T: RaftTransport,
        P: ConfigProvider + 'static,
    {
        let config = deps.provider.partition_config(deps.partition)?;
        let data_dir = deps.provider.data_dir(deps.partition)?;
        std::fs::create_dir_all(&data_dir)?;

        let meta = MetaStore::open(&data_dir)?;
        let snapshots = SnapshotStore::open(&data_dir.join("snapshots"))?;
        let mut log = SegmentedLog::open(&data_dir, config.storage.clone())?;

        // A persisted snapshot is the recovery starting point; the log
        // restarts above it when local entries cannot bridge the gap
        if let Some(latest) = snapshots.latest()? {
            log.align_with_snapshot(latest.index(), latest.term())?;
        }

        let (membership, membership_writer) =
            Membership::new(deps.member.clone(), deps.members);
        let (commit_tx, commit_rx) = mpsc::channel(COMMIT_FEED_CAPACITY);

        let (handle, actor) = RaftNode::spawn(
            config.clone(),
            RaftDeps {
                member: deps.member.clone(),
                partition: deps.partition,
                membership,
                transport: deps.transport,
                log,
                meta,
                snapshots,
                commits: commit_tx,
            },
        )?;

        let snapshotter = deps.snapshot_source.map(|source| {
            tokio::spawn(
                SnapshotDriver {
                    handle: handle.clone(),
                    source,
                    commit_interval: config.snapshot.commit_interval,
                }
                .run(),
            )
        });

        info!(
            partition = %deps.partition,
            member = %deps.member,
            dir = %data_dir.display(),
            "partition bootstrapped"
        );

        Ok(Partition {
            partition: deps.partition,
            member: deps.member,
            handle,
            actor,
            snapshotter,
            commit_rx: Some(commit_rx),
            membership: membership_writer,
        })
    }

    /// Stop the partition: snapshot scheduling first, then the consensus
    /// actor, which closes log storage and aborts any snapshot transfer.
    /// Partial failures are logged and do not halt the shutdown.
    pub async fn stop(mut self) {
        info!(partition = %self.partition, member = %self.member, "stopping partition");

        if let Some(snapshotter) = self.snapshotter.take() {
            snapshotter.abort();
            let _ = snapshotter.await;
        }

        self.handle.shutdown().await;
        if let Err(e) = self.actor.await {
            warn!(error = %e, "consensus actor did not stop cleanly");
        }

        info!(partition = %self.partition, "partition stopped");
    }

    /// Take the committed-entry feed. Single-consumer: the first caller
    /// gets it, later calls return `None`.
    pub fn commit_feed(&mut self) -> Option<mpsc::Receiver<CommitEvent>> {
        self.commit_rx.take()
    }

    /// Handle for appends, RPCs, and administration
    pub fn handle(&self) -> &RaftHandle {
        &self.handle
    }

    /// Writer the cluster membership provider uses to push changes
    pub fn membership_writer(&self) -> &MembershipWriter {
        &self.membership
    }

    /// Current role, term, leader, commit index, and health
    pub fn role(&self) -> RoleReport {
        self.handle.role()
    }

    /// Watch role and health transitions
    pub fn role_watch(&self) -> watch::Receiver<RoleReport> {
        self.handle.role_watch()
    }

    /// Ask the replica to relinquish leadership if it holds it
    pub async fn step_down(&self) -> Result<AdminResponse, RaftError> {
        self.handle
            .admin(AdminRequest {
                partition: self.partition,
                kind: AdminRequestKind::StepDown,
            })
            .await
    }

    pub fn id(&self) -> PartitionId {
        self.partition
    }

    pub fn member(&self) -> &MemberId {
        &self.member
    }
}

#[cfg(test)]
#[path = "partition_tests.rs"]
mod tests;
