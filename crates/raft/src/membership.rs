// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster membership as supplied by an external provider
//!
//! The consensus core never discovers replicas itself. The membership
//! provider hands it the replica set up front and pushes changes through
//! a watch channel.

use tern_core::MemberId;
use tokio::sync::watch;

/// The replica set of one partition, as currently known
pub struct Membership {
    local: MemberId,
    rx: watch::Receiver<Vec<MemberId>>,
}

/// Provider-side handle for pushing membership changes
#[derive(Debug)]
pub struct MembershipWriter {
    tx: watch::Sender<Vec<MemberId>>,
}

impl Membership {
    /// Create a membership view plus the writer the cluster membership
    /// provider uses to publish changes
    pub fn new(local: MemberId, members: Vec<MemberId>) -> (Self, MembershipWriter) {
        let (tx, rx) = watch::channel(members);
        (Self { local, rx }, MembershipWriter { tx })
    }

    pub fn local(&self) -> &MemberId {
        &self.local
    }

    /// All replicas of the partition, including the local one
    pub fn members(&self) -> Vec<MemberId> {
        self.rx.borrow().clone()
    }

    /// All replicas except the local one
    pub fn peers(&self) -> Vec<MemberId> {
        self.rx
            .borrow()
            .iter()
            .filter(|m| **m != self.local)
            .cloned()
            .collect()
    }

    /// Strict majority of the replica set
    pub fn quorum(&self) -> usize {
        self.rx.borrow().len() / 2 + 1
    }

    /// Wait for the provider to publish a membership change.
    ///
    /// Pends forever once the provider goes away; the last known set
    /// stays in effect.
    pub async fn changed(&mut self) {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl MembershipWriter {
    /// Publish a new replica set
    pub fn update(&self, members: Vec<MemberId>) {
        self.tx.send_replace(members);
    }
}

#[cfg(test)]
#[path = "membership_tests.rs"]
mod tests;
