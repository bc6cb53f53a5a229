// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contract with the state-machine consumer
//!
//! The consumer drains the partition's commit feed in index order and,
//! when asked, serializes its applied state so the log can be compacted
//! behind a snapshot.

use async_trait::async_trait;
use thiserror::Error;

/// Applied state captured at a consistent point
pub struct StateCapture {
    /// Highest log index reflected in `data`
    pub last_applied_index: u64,
    pub data: Vec<u8>,
}

/// Capturing state failed; the snapshot attempt is skipped and retried
/// on a later commit-interval boundary
#[derive(Debug, Error)]
#[error("state capture failed: {0}")]
pub struct CaptureError(pub String);

impl CaptureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Supplies snapshot content for the partition's committed state
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn capture(&self) -> Result<StateCapture, CaptureError>;
}
