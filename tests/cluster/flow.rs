// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow control under a stalled quorum.

use crate::prelude::*;
use std::time::Duration;
use tern_core::MemberId;
use tern_raft::SubmitError;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn saturated_pipeline_recovers_when_the_quorum_catches_up() {
    let mut config = fast_config();
    config.raft.append_capacity = 1;

    // A single replica elects itself, then a phantom peer joins and the
    // quorum grows to two, so nothing can commit anymore
    let cluster = TestCluster::start_with(&["a"], config).await;
    let leader = cluster.wait_for_leader().await;
    let phantom = MemberId::new("phantom");

    cluster
        .partition(&leader)
        .membership_writer()
        .update(vec![leader.clone(), phantom.clone()]);
    sleep(Duration::from_millis(100)).await; // let the actor observe the change

    // Capacity 1: the first append stays in flight, the second is
    // backpressured, not failed
    let receipt = cluster.handle(&leader).append(b"stuck".to_vec()).unwrap();
    sleep(Duration::from_millis(50)).await;
    match cluster.handle(&leader).append(b"rejected".to_vec()) {
        Err(SubmitError::Saturated) => {}
        Ok(_) => panic!("pipeline should be saturated at capacity 1"),
        Err(other) => panic!("unexpected submit error: {other}"),
    }

    // The quorum shrinks back; the stuck append commits and frees its permit
    cluster
        .partition(&leader)
        .membership_writer()
        .update(vec![leader.clone()]);
    let index = receipt.await.unwrap().unwrap();
    assert_eq!(index, 1);

    let receipt = cluster.handle(&leader).append(b"after".to_vec()).unwrap();
    assert_eq!(receipt.await.unwrap().unwrap(), 2);

    cluster.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn lost_leadership_fails_in_flight_appends() {
    let mut config = fast_config();
    config.raft.append_capacity = 4;

    let cluster = TestCluster::start_with(&["a"], config).await;
    let leader = cluster.wait_for_leader().await;
    let phantom = MemberId::new("phantom");

    // Grow the quorum so the append cannot commit, then force the leader out
    cluster
        .partition(&leader)
        .membership_writer()
        .update(vec![leader.clone(), phantom.clone()]);
    sleep(Duration::from_millis(100)).await;

    let receipt = cluster.handle(&leader).append(b"doomed".to_vec()).unwrap();
    sleep(Duration::from_millis(50)).await;

    let resp = cluster.partition(&leader).step_down().await.unwrap();
    assert!(resp.accepted);

    // The commit-error channel reports the failure and frees the permit
    let outcome = receipt.await.unwrap();
    assert!(outcome.is_err(), "a stepped-down leader cannot commit");
    assert_eq!(cluster.handle(&leader).pipeline().in_flight(), 0);

    cluster.stop_all().await;
}
