// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshots received chunk by chunk from a leader
//!
//! The receiver tracks the next expected chunk id. Chunks must arrive in
//! order; re-applying an already-applied chunk is a no-op, so
//! retransmission after a lost acknowledgement is harmless.

use crate::chunk::{SnapshotChunk, SnapshotId};
use crate::error::SnapshotError;
use crate::store::{chunk_file_name, commit_staged, PersistedSnapshot};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// A snapshot transfer in progress on the receiving side
pub struct ReceivedSnapshot {
    root: PathBuf,
    id: SnapshotId,
    dir: PathBuf,
    next_chunk: u32,
    checksums: Vec<u32>,
    size_bytes: u64,
    complete: bool,
    finished: bool,
}

impl ReceivedSnapshot {
    pub(crate) fn new(root: PathBuf, id: SnapshotId, dir: PathBuf) -> Self {
        Self {
            root,
            id,
            dir,
            next_chunk: 0,
            checksums: Vec::new(),
            size_bytes: 0,
            complete: false,
            finished: false,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn index(&self) -> u64 {
        self.id.index
    }

    /// Chunk id the receiver expects next
    pub fn next_expected(&self) -> u32 {
        self.next_chunk
    }

    /// True if `chunk_id` is the one expected next
    pub fn is_expected_chunk(&self, chunk_id: u32) -> bool {
        chunk_id == self.next_chunk
    }

    /// True if `chunk_id` was already applied
    pub fn contains_chunk(&self, chunk_id: u32) -> bool {
        chunk_id < self.next_chunk
    }

    /// All chunks up to the declared last one have been applied
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Validate and store one chunk.
    ///
    /// Applying a chunk that is already present is a no-op. Out-of-order
    /// or corrupt chunks are rejected; the sender retransmits from
    /// [`Self::next_expected`].
    pub fn apply(&mut self, chunk: &SnapshotChunk) -> Result<(), SnapshotError> {
        if chunk.snapshot != self.id {
            return Err(SnapshotError::WrongSnapshot {
                expected: self.id,
                got: chunk.snapshot,
            });
        }
        if self.contains_chunk(chunk.id) {
            debug!(snapshot = %self.id, chunk = chunk.id, "chunk already applied");
            return Ok(());
        }
        if !self.is_expected_chunk(chunk.id) || self.complete {
            return Err(SnapshotError::UnexpectedChunk {
                expected: self.next_chunk,
                got: chunk.id,
            });
        }
        if !chunk.verify() {
            return Err(SnapshotError::ChunkChecksumMismatch { chunk: chunk.id });
        }

        fs::write(self.dir.join(chunk_file_name(chunk.id)), &chunk.payload)?;
        self.checksums.push(chunk.checksum);
        self.size_bytes += chunk.payload.len() as u64;
        self.next_chunk += 1;
        if chunk.last {
            self.complete = true;
        }
        Ok(())
    }

    /// Convert the fully received snapshot into a durable one
    pub fn persist(mut self) -> Result<PersistedSnapshot, SnapshotError> {
        if !self.complete {
            return Err(SnapshotError::Incomplete(self.id));
        }
        self.finished = true;
        commit_staged(
            &self.root,
            self.id,
            &self.dir.clone(),
            std::mem::take(&mut self.checksums),
            self.size_bytes,
        )
    }

    /// Discard the partial transfer and free its chunk storage
    pub fn abort(mut self) -> Result<(), SnapshotError> {
        self.finished = true;
        debug!(snapshot = %self.id, received = self.next_chunk, "aborting snapshot transfer");
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

impl Drop for ReceivedSnapshot {
    fn drop(&mut self) {
        if !self.finished {
            debug!(snapshot = %self.id, "dropping partial snapshot transfer");
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

#[cfg(test)]
#[path = "received_tests.rs"]
mod tests;
