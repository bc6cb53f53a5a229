// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader failover: the canonical three-replica crash scenario.

use crate::prelude::*;
use tern_core::Term;

#[tokio::test(start_paused = true)]
async fn new_leader_continues_the_log_after_a_crash() {
    let mut cluster = TestCluster::start(&["a", "b", "c"]).await;
    let first_leader = cluster.wait_for_leader().await;
    let first_term = cluster.partition(&first_leader).role().term;

    // Term-1 leader commits entries 1..=3
    for n in 1..=3u64 {
        let index = cluster
            .append_and_commit(&first_leader, format!("entry-{n}").as_bytes())
            .await;
        assert_eq!(index, n);
    }
    let survivors: Vec<_> = cluster
        .members
        .clone()
        .into_iter()
        .filter(|m| *m != first_leader)
        .collect();
    for member in &survivors {
        cluster.wait_for_commit(member, 3).await;
    }

    // The leader dies; a replica whose log matches 1..=3 takes over
    cluster.crash(&first_leader).await;
    let second_leader = cluster.wait_for_leader().await;
    assert_ne!(second_leader, first_leader);
    let second_term = cluster.partition(&second_leader).role().term;
    assert!(second_term > first_term);

    // The new leader appends entry 4; a quorum of the survivors commits it
    let index = cluster.append_and_commit(&second_leader, b"entry-4").await;
    assert_eq!(index, 4);

    // Every surviving consumer observes entries 1..=4 in exactly that order
    for member in &survivors {
        cluster.wait_for_commit(member, 4).await;
        for n in 1..=4u64 {
            let entry = cluster.expect_entry(member, n).await;
            if n <= 3 {
                assert_eq!(entry.term, first_term);
                assert_eq!(entry.payload, format!("entry-{n}").into_bytes());
            } else {
                assert_eq!(entry.term, second_term);
                assert_eq!(entry.payload, b"entry-4");
            }
        }
    }

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn commit_index_is_monotone_across_a_failover() {
    let mut cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;

    for n in 1..=3u64 {
        cluster
            .append_and_commit(&leader, format!("entry-{n}").as_bytes())
            .await;
    }
    let survivors: Vec<_> = cluster
        .members
        .clone()
        .into_iter()
        .filter(|m| *m != leader)
        .collect();
    for member in &survivors {
        cluster.wait_for_commit(member, 3).await;
    }
    let before: Vec<u64> = survivors
        .iter()
        .map(|m| cluster.partition(m).role().commit_index)
        .collect();

    cluster.crash(&leader).await;
    let new_leader = cluster.wait_for_leader().await;
    cluster.append_and_commit(&new_leader, b"after-failover").await;

    for (member, commit_before) in survivors.iter().zip(before) {
        assert!(
            cluster.partition(member).role().commit_index >= commit_before,
            "commit index went backwards on {member}"
        );
    }

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn crashed_replica_rejoins_and_catches_up() {
    let mut cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;
    let follower = cluster
        .members
        .iter()
        .find(|m| **m != leader)
        .unwrap()
        .clone();

    cluster.append_and_commit(&leader, b"before-crash").await;
    cluster.wait_for_commit(&follower, 1).await;
    let _ = cluster.expect_entry(&follower, 1).await;

    cluster.crash(&follower).await;
    cluster.append_and_commit(&leader, b"while-down").await;

    // The replica comes back with its old disk and replays the rest
    cluster.restart(&follower, false).await;
    cluster.wait_for_commit(&follower, 2).await;

    // Restarted consumers re-apply from their last local state; the feed
    // starts over at the first entry still in the local log
    let first = cluster.expect_entry(&follower, 1).await;
    assert_eq!(first.payload, b"before-crash");
    let second = cluster.expect_entry(&follower, 2).await;
    assert_eq!(second.payload, b"while-down");
    assert_ne!(second.term, Term::ZERO);

    cluster.stop_all().await;
}
