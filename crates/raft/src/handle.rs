// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clonable handle onto a partition's consensus actor
//!
//! The handle is how everything outside the actor talks to it: client
//! appends (through the flow-control pipeline), inbound RPCs from the
//! transport server, admin operations, and shutdown.

use crate::error::RaftError;
use crate::flow::{AppendListener, AppendPipeline};
use crate::msg::RaftMsg;
use crate::role::RoleReport;
use tern_core::{
    AdminRequest, AdminResponse, AppendRequest, AppendResponse, InstallRequest, InstallResponse,
    VoteRequest, VoteResponse,
};
use tern_snapshot::SnapshotId;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

/// Why an append submission did not enter the pipeline.
///
/// `Saturated` is backpressure, not a failure; retry once an in-flight
/// append completes.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("append pipeline is saturated")]
    Saturated,
    #[error("consensus actor stopped")]
    Closed,
}

/// Resolves with the committed index, or the append's terminal error
pub type CommitReceipt = oneshot::Receiver<Result<u64, RaftError>>;

/// Handle used by clients, the transport server, and administration
#[derive(Clone, Debug)]
pub struct RaftHandle {
    pub(crate) tx: mpsc::Sender<RaftMsg>,
    pub(crate) pipeline: AppendPipeline,
    pub(crate) role_rx: watch::Receiver<RoleReport>,
}

impl RaftHandle {
    /// Submit one entry with a custom listener.
    ///
    /// Acquires a flow-control permit first; the listener receives
    /// exactly one terminal callback once the permit is accepted.
    pub fn try_append(
        &self,
        payload: Vec<u8>,
        listener: Box<dyn AppendListener>,
    ) -> Result<(), SubmitError> {
        let permit = self
            .pipeline
            .try_acquire(listener)
            .ok_or(SubmitError::Saturated)?;

        match self.tx.try_send(RaftMsg::ClientAppend { payload, permit }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                if let RaftMsg::ClientAppend { permit, .. } = msg {
                    permit.release();
                }
                Err(SubmitError::Saturated)
            }
            Err(TrySendError::Closed(msg)) => {
                if let RaftMsg::ClientAppend { permit, .. } = msg {
                    permit.release();
                }
                Err(SubmitError::Closed)
            }
        }
    }

    /// Submit one entry and get a receipt to await its outcome
    pub fn append(&self, payload: Vec<u8>) -> Result<CommitReceipt, SubmitError> {
        let (tx, rx) = oneshot::channel();
        self.try_append(payload, Box::new(ReceiptListener { tx: Some(tx) }))?;
        Ok(rx)
    }

    /// Inbound vote RPC, forwarded onto the actor task
    pub async fn vote(&self, request: VoteRequest) -> Result<VoteResponse, RaftError> {
        self.round_trip(|reply| RaftMsg::Vote(request, reply)).await
    }

    /// Inbound append RPC
    pub async fn append_entries(
        &self,
        request: AppendRequest,
    ) -> Result<AppendResponse, RaftError> {
        self.round_trip(|reply| RaftMsg::Append(request, reply))
            .await
    }

    /// Inbound snapshot chunk RPC
    pub async fn install(&self, request: InstallRequest) -> Result<InstallResponse, RaftError> {
        self.round_trip(|reply| RaftMsg::Install(request, reply))
            .await
    }

    /// Out-of-band administrative request
    pub async fn admin(&self, request: AdminRequest) -> Result<AdminResponse, RaftError> {
        self.round_trip(|reply| RaftMsg::Admin(request, reply)).await
    }

    /// Snapshot committed state at `index` and compact the log below it
    pub async fn create_snapshot(
        &self,
        index: u64,
        content: Vec<u8>,
    ) -> Result<SnapshotId, RaftError> {
        self.round_trip(|reply| RaftMsg::CreateSnapshot {
            index,
            content,
            reply,
        })
        .await?
    }

    /// Current role, term, leader, and commit index
    pub fn role(&self) -> RoleReport {
        self.role_rx.borrow().clone()
    }

    /// Watch role changes; the report updates on every transition
    pub fn role_watch(&self) -> watch::Receiver<RoleReport> {
        self.role_rx.clone()
    }

    /// The flow-control pipeline feeding this partition
    pub fn pipeline(&self) -> &AppendPipeline {
        &self.pipeline
    }

    /// Ask the actor to stop and wait until it acknowledges.
    ///
    /// Idempotent: an actor that is already gone counts as stopped.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(RaftMsg::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn round_trip<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> RaftMsg,
    ) -> Result<R, RaftError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .await
            .map_err(|_| RaftError::Shutdown)?;
        rx.await.map_err(|_| RaftError::Shutdown)
    }
}

/// Listener that resolves a [`CommitReceipt`]
struct ReceiptListener {
    tx: Option<oneshot::Sender<Result<u64, RaftError>>>,
}

impl AppendListener for ReceiptListener {
    fn on_commit(&mut self, index: u64) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(index));
        }
    }

    fn on_write_error(&mut self, error: RaftError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }

    fn on_commit_error(&mut self, _index: u64, error: RaftError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }
}
