// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for log storage

use thiserror::Error;

/// Errors from segment and log store operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt segment {segment} at record {index}: {reason}")]
    CorruptSegment {
        segment: String,
        index: u64,
        reason: String,
    },
    #[error("checksum mismatch at index {index}")]
    ChecksumMismatch { index: u64 },
    #[error("append at index {index} does not follow last index {last}")]
    NonContiguousAppend { index: u64, last: u64 },
    #[error("truncation at index {index} would remove committed entries (commit floor {floor})")]
    TruncateBelowCommit { index: u64, floor: u64 },
    #[error("truncation at index {index} is below the compaction boundary {boundary}")]
    TruncateBelowBoundary { index: u64, boundary: u64 },
    #[error("record of {bytes} bytes exceeds segment capacity {capacity}")]
    RecordTooLarge { bytes: u64, capacity: u64 },
    #[error("segment is full")]
    SegmentFull,
}
