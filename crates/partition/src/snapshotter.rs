// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot scheduling
//!
//! Watches commit progress and, every `commit_interval` committed
//! entries, captures the consumer's applied state into a persisted
//! snapshot, which compacts the log behind it. Runs beside the
//! consensus actor and never blocks it.

use crate::state_machine::SnapshotSource;
use std::sync::Arc;
use tern_raft::RaftHandle;
use tracing::{debug, warn};

pub(crate) struct SnapshotDriver {
    pub handle: RaftHandle,
    pub source: Arc<dyn SnapshotSource>,
    pub commit_interval: u64,
}

impl SnapshotDriver {
    pub async fn run(self) {
        let mut role_rx = self.handle.role_watch();
        let mut last_snapshot = 0u64;

        loop {
            if role_rx.changed().await.is_err() {
                return; // partition stopped
            }
            let commit_index = role_rx.borrow_and_update().commit_index;
            if commit_index.saturating_sub(last_snapshot) < self.commit_interval {
                continue;
            }

            let capture = match self.source.capture().await {
                Ok(capture) => capture,
                Err(e) => {
                    warn!(error = %e, "state capture failed; skipping snapshot");
                    continue;
                }
            };

            // Snapshot at what the consumer has actually applied, capped
            // by what consensus has committed
            let index = capture.last_applied_index.min(commit_index);
            if index <= last_snapshot {
                debug!(index, last_snapshot, "consumer has not applied enough; skipping");
                continue;
            }

            match self.handle.create_snapshot(index, capture.data).await {
                Ok(id) => {
                    debug!(snapshot = %id, "snapshot taken");
                    last_snapshot = id.index;
                }
                Err(e) => warn!(error = %e, index, "snapshot creation failed"),
            }
        }
    }
}
