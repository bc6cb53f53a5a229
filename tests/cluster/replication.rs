// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log replication across a healthy cluster.

use crate::prelude::*;
use tern_raft::SubmitError;

#[tokio::test(start_paused = true)]
async fn committed_entries_reach_every_replica_in_order() {
    let mut cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;

    for n in 1..=5u64 {
        let index = cluster
            .append_and_commit(&leader, format!("record-{n}").as_bytes())
            .await;
        assert_eq!(index, n);
    }

    for member in cluster.members.clone() {
        cluster.wait_for_commit(&member, 5).await;
        for n in 1..=5u64 {
            let entry = cluster.expect_entry(&member, n).await;
            assert_eq!(entry.payload, format!("record-{n}").into_bytes());
        }
    }

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn replicas_hold_identical_entries_at_shared_indices() {
    let mut cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;

    for n in 1..=3u64 {
        cluster
            .append_and_commit(&leader, format!("payload-{n}").as_bytes())
            .await;
    }

    let mut per_member = Vec::new();
    for member in cluster.members.clone() {
        cluster.wait_for_commit(&member, 3).await;
        let mut entries = Vec::new();
        for n in 1..=3u64 {
            entries.push(cluster.expect_entry(&member, n).await);
        }
        per_member.push(entries);
    }

    // Same index, same term, same payload on every replica
    let reference = &per_member[0];
    for entries in &per_member[1..] {
        for (ours, theirs) in reference.iter().zip(entries) {
            assert_eq!(ours.index, theirs.index);
            assert_eq!(ours.term, theirs.term);
            assert_eq!(ours.payload, theirs.payload);
        }
    }

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn append_on_a_follower_is_refused() {
    let cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;
    let follower = cluster
        .members
        .iter()
        .find(|m| **m != leader)
        .unwrap()
        .clone();

    // Make sure the follower recognizes the leader before submitting
    cluster.append_and_commit(&leader, b"seed").await;
    cluster.wait_for_commit(&follower, 1).await;

    match cluster.handle(&follower).append(b"misrouted".to_vec()) {
        Ok(receipt) => {
            let outcome = receipt.await.unwrap();
            assert!(outcome.is_err(), "a follower must not accept appends");
        }
        Err(SubmitError::Saturated | SubmitError::Closed) => {
            panic!("submission should reach the follower and fail there")
        }
    }

    cluster.stop_all().await;
}
