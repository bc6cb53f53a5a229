// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for snapshot operations

use crate::chunk::SnapshotId;
use thiserror::Error;

/// Errors from snapshot building, transfer, and persistence
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot not found: {0}")]
    NotFound(String),
    #[error("snapshot {0} is already persisted")]
    AlreadyPersisted(SnapshotId),
    #[error("chunk {chunk} failed its integrity check")]
    ChunkChecksumMismatch { chunk: u32 },
    #[error("expected chunk {expected}, got {got}")]
    UnexpectedChunk { expected: u32, got: u32 },
    #[error("chunk belongs to snapshot {got}, receiving {expected}")]
    WrongSnapshot {
        expected: SnapshotId,
        got: SnapshotId,
    },
    #[error("snapshot {0} is missing chunks and cannot be persisted")]
    Incomplete(SnapshotId),
}
