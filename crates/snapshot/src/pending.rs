// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshots being built from local committed state
//!
//! A pending snapshot is volatile and owned exclusively by its builder
//! until `persist` moves it into the store. Dropping it without
//! persisting releases its staging space.

use crate::chunk::SnapshotId;
use crate::error::SnapshotError;
use crate::store::{chunk_file_name, commit_staged, PersistedSnapshot};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// A snapshot under construction on the sending side
#[derive(Debug)]
pub struct PendingSnapshot {
    root: PathBuf,
    id: SnapshotId,
    dir: PathBuf,
    checksums: Vec<u32>,
    size_bytes: u64,
    finished: bool,
}

impl PendingSnapshot {
    pub(crate) fn new(root: PathBuf, id: SnapshotId, dir: PathBuf) -> Self {
        Self {
            root,
            id,
            dir,
            checksums: Vec::new(),
            size_bytes: 0,
            finished: false,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn chunk_count(&self) -> u32 {
        self.checksums.len() as u32
    }

    /// Append one chunk of snapshot content; returns its chunk id
    pub fn write_chunk(&mut self, payload: &[u8]) -> Result<u32, SnapshotError> {
        let id = self.checksums.len() as u32;
        fs::write(self.dir.join(chunk_file_name(id)), payload)?;
        self.checksums.push(crc32fast::hash(payload));
        self.size_bytes += payload.len() as u64;
        Ok(id)
    }

    /// Chunk the full snapshot content at `chunk_size` bytes.
    ///
    /// Empty content still produces one (empty) chunk so the transfer
    /// protocol always has a final chunk to mark completion with.
    pub fn write_all(&mut self, content: &[u8], chunk_size: usize) -> Result<u32, SnapshotError> {
        let chunk_size = chunk_size.max(1);
        if content.is_empty() {
            self.write_chunk(&[])?;
        } else {
            for piece in content.chunks(chunk_size) {
                self.write_chunk(piece)?;
            }
        }
        Ok(self.chunk_count())
    }

    /// Convert the completed snapshot into a durable, installable one
    pub fn persist(mut self) -> Result<PersistedSnapshot, SnapshotError> {
        self.finished = true;
        commit_staged(
            &self.root,
            self.id,
            &self.dir.clone(),
            std::mem::take(&mut self.checksums),
            self.size_bytes,
        )
    }

    /// Discard the snapshot and free its staging space
    pub fn abort(mut self) -> Result<(), SnapshotError> {
        self.finished = true;
        debug!(snapshot = %self.id, "aborting pending snapshot");
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

impl Drop for PendingSnapshot {
    fn drop(&mut self) {
        if !self.finished {
            debug!(snapshot = %self.id, "dropping unpersisted snapshot");
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
