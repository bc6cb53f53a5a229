// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: an in-memory transport and a small cluster builder.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tern_core::{
    AppendRequest, AppendResponse, InstallRequest, InstallResponse, LogEntry, MemberId,
    PartitionConfig, PartitionId, RaftConfig, SnapshotConfig, StorageConfig, VoteRequest,
    VoteResponse,
};
use tern_partition::{Partition, PartitionDeps, StaticConfig};
use tern_raft::{CommitEvent, RaftHandle, RaftTransport, Role, TransportError};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

pub const POLL: Duration = Duration::from_millis(10);
pub const FEED_WAIT: Duration = Duration::from_secs(5);

pub fn fast_config() -> PartitionConfig {
    PartitionConfig {
        raft: RaftConfig {
            election_timeout_min: Duration::from_millis(50),
            election_timeout_max: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(20),
            ..RaftConfig::default()
        },
        storage: StorageConfig {
            segment_capacity: 2048,
            index_interval: 4,
            sync_on_append: false,
        },
        snapshot: SnapshotConfig {
            chunk_size: 64,
            ..SnapshotConfig::default()
        },
    }
}

/// In-memory network connecting the replicas of one test cluster.
/// Members can be taken down to simulate partitions and crashes.
pub struct TestNet {
    routes: Mutex<HashMap<MemberId, RaftHandle>>,
    down: Mutex<HashSet<MemberId>>,
}

impl TestNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            down: Mutex::new(HashSet::new()),
        })
    }

    pub fn register(&self, member: MemberId, handle: RaftHandle) {
        self.routes.lock().unwrap().insert(member, handle);
    }

    pub fn deregister(&self, member: &MemberId) {
        self.routes.lock().unwrap().remove(member);
    }

    /// Cut all traffic to and from a member
    pub fn isolate(&self, member: &MemberId) {
        self.down.lock().unwrap().insert(member.clone());
    }

    fn route(&self, from: &MemberId, to: &MemberId) -> Result<RaftHandle, TransportError> {
        {
            let down = self.down.lock().unwrap();
            if down.contains(from) || down.contains(to) {
                return Err(TransportError::Unreachable(to.clone()));
            }
        }
        self.routes
            .lock()
            .unwrap()
            .get(to)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(to.clone()))
    }
}

/// Per-replica transport over a [`TestNet`]
pub struct NetTransport {
    pub from: MemberId,
    pub net: Arc<TestNet>,
}

#[async_trait]
impl RaftTransport for NetTransport {
    async fn vote(
        &self,
        to: &MemberId,
        request: VoteRequest,
    ) -> Result<VoteResponse, TransportError> {
        let handle = self.net.route(&self.from, to)?;
        handle
            .vote(request)
            .await
            .map_err(|_| TransportError::Unreachable(to.clone()))
    }

    async fn append(
        &self,
        to: &MemberId,
        request: AppendRequest,
    ) -> Result<AppendResponse, TransportError> {
        let handle = self.net.route(&self.from, to)?;
        handle
            .append_entries(request)
            .await
            .map_err(|_| TransportError::Unreachable(to.clone()))
    }

    async fn install(
        &self,
        to: &MemberId,
        request: InstallRequest,
    ) -> Result<InstallResponse, TransportError> {
        let handle = self.net.route(&self.from, to)?;
        handle
            .install(request)
            .await
            .map_err(|_| TransportError::Unreachable(to.clone()))
    }
}

/// A running multi-replica partition plus its commit feeds
pub struct TestCluster {
    pub net: Arc<TestNet>,
    pub members: Vec<MemberId>,
    partitions: HashMap<MemberId, Partition>,
    feeds: HashMap<MemberId, mpsc::Receiver<CommitEvent>>,
    dirs: HashMap<MemberId, TempDir>,
    config: PartitionConfig,
}

impl TestCluster {
    pub async fn start(names: &[&str]) -> Self {
        Self::start_with(names, fast_config()).await
    }

    pub async fn start_with(names: &[&str], config: PartitionConfig) -> Self {
        let members: Vec<MemberId> = names.iter().map(|n| MemberId::new(*n)).collect();
        let mut cluster = Self {
            net: TestNet::new(),
            members: members.clone(),
            partitions: HashMap::new(),
            feeds: HashMap::new(),
            dirs: HashMap::new(),
            config,
        };
        for member in members {
            cluster.boot(member).await;
        }
        cluster
    }

    async fn boot(&mut self, member: MemberId) {
        let dir = self
            .dirs
            .remove(&member)
            .unwrap_or_else(|| TempDir::new().unwrap());

        let mut partition = Partition::bootstrap(PartitionDeps {
            member: member.clone(),
            partition: PartitionId(1),
            members: self.members.clone(),
            transport: Arc::new(NetTransport {
                from: member.clone(),
                net: Arc::clone(&self.net),
            }),
            provider: StaticConfig {
                config: self.config.clone(),
                root_dir: dir.path().to_path_buf(),
            },
            snapshot_source: None,
        })
        .await
        .unwrap();

        self.net.register(member.clone(), partition.handle().clone());
        self.feeds.insert(member.clone(), partition.commit_feed().unwrap());
        self.partitions.insert(member.clone(), partition);
        self.dirs.insert(member, dir);
    }

    /// Stop a replica and drop it off the network
    pub async fn crash(&mut self, member: &MemberId) {
        self.net.deregister(member);
        self.feeds.remove(member);
        if let Some(partition) = self.partitions.remove(member) {
            partition.stop().await;
        }
    }

    /// Bring a crashed replica back, optionally with a wiped disk
    pub async fn restart(&mut self, member: &MemberId, fresh_disk: bool) {
        if fresh_disk {
            self.dirs.remove(member);
        }
        self.boot(member.clone()).await;
    }

    pub fn partition(&self, member: &MemberId) -> &Partition {
        &self.partitions[member]
    }

    pub fn handle(&self, member: &MemberId) -> &RaftHandle {
        self.partitions[member].handle()
    }

    /// Wait until some healthy replica reports leadership
    pub async fn wait_for_leader(&self) -> MemberId {
        for _ in 0..1000 {
            for (member, partition) in &self.partitions {
                let report = partition.role();
                if report.role == Role::Leader && report.healthy {
                    return member.clone();
                }
            }
            sleep(POLL).await;
        }
        panic!("no leader elected in time");
    }

    /// Wait until a replica's commit index reaches `index`
    pub async fn wait_for_commit(&self, member: &MemberId, index: u64) {
        for _ in 0..2000 {
            if self.partitions[member].role().commit_index >= index {
                return;
            }
            sleep(POLL).await;
        }
        panic!(
            "{member} never reached commit index {index} (at {})",
            self.partitions[member].role().commit_index
        );
    }

    /// Append through a replica and wait for quorum commitment
    pub async fn append_and_commit(&self, member: &MemberId, payload: &[u8]) -> u64 {
        let receipt = self.handle(member).append(payload.to_vec()).unwrap();
        receipt.await.unwrap().unwrap()
    }

    /// Receive the next committed entry from a replica's feed
    pub async fn expect_entry(&mut self, member: &MemberId, index: u64) -> LogEntry {
        let feed = self.feeds.get_mut(member).unwrap();
        match timeout(FEED_WAIT, feed.recv()).await.unwrap().unwrap() {
            CommitEvent::Entry(entry) => {
                assert_eq!(entry.index, index, "out-of-order delivery on {member}");
                entry
            }
            other => panic!("expected entry {index} on {member}, got {other:?}"),
        }
    }

    /// Receive a snapshot-install notification from a replica's feed
    pub async fn expect_snapshot(&mut self, member: &MemberId) -> u64 {
        let feed = self.feeds.get_mut(member).unwrap();
        match timeout(FEED_WAIT, feed.recv()).await.unwrap().unwrap() {
            CommitEvent::SnapshotInstalled { index, .. } => index,
            other => panic!("expected snapshot install on {member}, got {other:?}"),
        }
    }

    pub async fn stop_all(mut self) {
        for (_, partition) in self.partitions.drain() {
            partition.stop().await;
        }
    }
}
