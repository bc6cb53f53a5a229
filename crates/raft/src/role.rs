// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replica roles and the observable role report

use std::fmt;
use tern_core::{MemberId, Term};

/// The role a replica currently plays in its partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
        }
    }
}

/// Snapshot of a replica's consensus state, published on every change
/// for administrative callers
#[derive(Debug, Clone)]
pub struct RoleReport {
    pub role: Role,
    pub term: Term,
    /// Leader the replica currently recognizes, if any
    pub leader: Option<MemberId>,
    pub commit_index: u64,
    /// False once a local write failure marks the partition unhealthy
    pub healthy: bool,
}
