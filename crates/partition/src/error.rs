// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for partition lifecycle

use crate::config::ConfigError;
use thiserror::Error;

/// Why a partition failed to bootstrap.
///
/// Always delivered by the bootstrap future completing with an error,
/// never thrown out of the `bootstrap` call itself.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] tern_storage::StorageError),
    #[error("snapshot store error: {0}")]
    Snapshot(#[from] tern_snapshot::SnapshotError),
    #[error("consensus error: {0}")]
    Raft(#[from] tern_raft::RaftError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
