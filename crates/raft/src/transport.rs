// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam for replica-to-replica RPCs
//!
//! The consensus core is wired with a concrete transport at the
//! composition root; it never opens connections itself.

use async_trait::async_trait;
use tern_core::{
    AppendRequest, AppendResponse, InstallRequest, InstallResponse, MemberId, VoteRequest,
    VoteResponse,
};
use thiserror::Error;

/// Errors from the RPC layer.
///
/// All of these are transient from the consensus core's point of view;
/// replication retries with backoff and elections retry on timeout.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("member {0} is unreachable")]
    Unreachable(MemberId),
    #[error("request to {0} timed out")]
    Timeout(MemberId),
    #[error("transport closed")]
    Closed,
}

/// Replica-to-replica RPCs used by the consensus core
#[async_trait]
pub trait RaftTransport: Send + Sync + 'static {
    async fn vote(
        &self,
        to: &MemberId,
        request: VoteRequest,
    ) -> Result<VoteResponse, TransportError>;

    async fn append(
        &self,
        to: &MemberId,
        request: AppendRequest,
    ) -> Result<AppendResponse, TransportError>;

    async fn install(
        &self,
        to: &MemberId,
        request: InstallRequest,
    ) -> Result<InstallResponse, TransportError>;
}
