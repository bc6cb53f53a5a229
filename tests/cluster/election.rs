// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader election scenarios.

use crate::prelude::*;
use tern_raft::Role;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn three_replicas_elect_exactly_one_leader() {
    let cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;

    // Wait until the cluster settles: one leader, everyone on its term
    let mut settled = false;
    for _ in 0..500 {
        let leader_report = cluster.partition(&leader).role();
        let mut leaders = 0;
        let mut agreed = 0;
        for member in &cluster.members {
            let report = cluster.partition(member).role();
            if report.role == Role::Leader {
                leaders += 1;
            }
            if report.term == leader_report.term && report.leader.as_ref() == Some(&leader) {
                agreed += 1;
            }
        }
        if leaders == 1 && agreed == cluster.members.len() {
            settled = true;
            break;
        }
        sleep(POLL).await;
    }
    assert!(settled, "cluster never settled on a single leader");

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn stepped_down_leader_is_replaced() {
    let cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;

    let resp = cluster.partition(&leader).step_down().await.unwrap();
    assert!(resp.accepted);
    assert_ne!(cluster.partition(&leader).role().role, Role::Leader);

    // Some replica (possibly the same one) wins a later election
    let next = cluster.wait_for_leader().await;
    assert!(cluster.members.contains(&next));

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn minority_partition_cannot_elect_a_leader() {
    let cluster = TestCluster::start(&["a", "b", "c"]).await;
    let leader = cluster.wait_for_leader().await;

    // Cut one follower off; it keeps timing out without reaching quorum
    let lonely = cluster
        .members
        .iter()
        .find(|m| **m != leader)
        .unwrap()
        .clone();
    cluster.net.isolate(&lonely);

    sleep(std::time::Duration::from_secs(2)).await;
    assert_ne!(
        cluster.partition(&lonely).role().role,
        Role::Leader,
        "an isolated replica must not win an election"
    );

    cluster.stop_all().await;
}
