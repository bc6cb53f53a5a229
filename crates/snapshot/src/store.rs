// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot discovery, persistence, and retention
//!
//! Persisted snapshots live in one directory each, named by the index
//! and term they cover, holding ordered chunk files and a metadata
//! record. In-progress snapshots are staged in a scratch directory and
//! moved into place with an atomic rename on persist.

use crate::chunk::{SnapshotChunk, SnapshotId};
use crate::error::SnapshotError;
use crate::pending::PendingSnapshot;
use crate::received::ReceivedSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGING_DIR: &str = "staging";
const META_FILE: &str = "meta.json";

/// Metadata persisted alongside a snapshot's chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub index: u64,
    pub term: tern_core::Term,
    pub chunk_count: u32,
    /// CRC32 per chunk, in chunk order
    pub checksums: Vec<u32>,
    pub size_bytes: u64,
}

/// Manages a partition's snapshots on disk
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open the store, discarding any staging debris from a prior run.
    ///
    /// A snapshot that never persisted is worthless after a restart; the
    /// sender or leader will start a fresh transfer.
    pub fn open(root: &Path) -> Result<Self, SnapshotError> {
        fs::create_dir_all(root)?;

        let staging = root.join(STAGING_DIR);
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(error = %e, "failed to clear snapshot staging directory");
            }
        }
        fs::create_dir_all(&staging)?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// List persisted snapshots, newest first
    pub fn list(&self) -> Result<Vec<PersistedSnapshot>, SnapshotError> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = SnapshotId::parse(name) else {
                continue;
            };
            match Self::load_persisted(&path, id) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(snapshot = %id, error = %e, "skipping unreadable snapshot"),
            }
        }
        snapshots.sort_by(|a, b| b.id().cmp(&a.id()));
        Ok(snapshots)
    }

    /// The most recent persisted snapshot, if any
    pub fn latest(&self) -> Result<Option<PersistedSnapshot>, SnapshotError> {
        Ok(self.list()?.into_iter().next())
    }

    /// Start building a snapshot from local committed state
    pub fn new_pending(&self, id: SnapshotId) -> Result<PendingSnapshot, SnapshotError> {
        if self.persisted_dir(&id).exists() {
            return Err(SnapshotError::AlreadyPersisted(id));
        }
        let dir = self.staging_dir(&id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        debug!(snapshot = %id, "staging pending snapshot");
        Ok(PendingSnapshot::new(self.root.clone(), id, dir))
    }

    /// Start receiving a snapshot transferred chunk by chunk
    pub fn new_received(&self, id: SnapshotId) -> Result<ReceivedSnapshot, SnapshotError> {
        if self.persisted_dir(&id).exists() {
            return Err(SnapshotError::AlreadyPersisted(id));
        }
        let dir = self.staging_dir(&id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        info!(snapshot = %id, "receiving snapshot");
        Ok(ReceivedSnapshot::new(self.root.clone(), id, dir))
    }

    /// Delete persisted snapshots older than `boundary`, keeping the
    /// `keep` most recent of them. Returns the ids removed.
    pub fn purge_older_than(
        &self,
        boundary: u64,
        keep: usize,
    ) -> Result<Vec<SnapshotId>, SnapshotError> {
        let mut deleted = Vec::new();
        let mut old_kept = 0;

        for snapshot in self.list()? {
            if snapshot.index() >= boundary {
                continue;
            }
            if old_kept < keep {
                old_kept += 1;
                continue;
            }
            fs::remove_dir_all(snapshot.dir())?;
            debug!(snapshot = %snapshot.id(), "deleted old snapshot");
            deleted.push(snapshot.id());
        }
        Ok(deleted)
    }

    fn persisted_dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.dir_name())
    }

    fn staging_dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(STAGING_DIR).join(id.dir_name())
    }

    fn load_persisted(dir: &Path, id: SnapshotId) -> Result<PersistedSnapshot, SnapshotError> {
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(SnapshotError::NotFound(format!(
                "{} has no metadata",
                dir.display()
            )));
        }
        let meta: SnapshotMeta = serde_json::from_str(&fs::read_to_string(meta_path)?)?;
        Ok(PersistedSnapshot {
            id,
            dir: dir.to_path_buf(),
            meta,
        })
    }
}

/// Move a complete staged snapshot into its final directory.
///
/// Chunk files are fsynced, metadata is written last, and the staging
/// directory is renamed atomically. If the snapshot was persisted
/// concurrently, the staged copy is dropped and the existing one wins.
pub(crate) fn commit_staged(
    root: &Path,
    id: SnapshotId,
    staged: &Path,
    checksums: Vec<u32>,
    size_bytes: u64,
) -> Result<PersistedSnapshot, SnapshotError> {
    let final_dir = root.join(id.dir_name());
    if final_dir.exists() {
        fs::remove_dir_all(staged)?;
        return SnapshotStore::load_persisted(&final_dir, id);
    }

    for n in 0..checksums.len() as u32 {
        File::open(staged.join(chunk_file_name(n)))?.sync_all()?;
    }

    let meta = SnapshotMeta {
        index: id.index,
        term: id.term,
        chunk_count: checksums.len() as u32,
        checksums,
        size_bytes,
    };
    {
        let mut file = File::create(staged.join(META_FILE))?;
        file.write_all(serde_json::to_string(&meta)?.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(staged, &final_dir)?;
    info!(snapshot = %id, size_bytes, "persisted snapshot");

    Ok(PersistedSnapshot {
        id,
        dir: final_dir,
        meta,
    })
}

pub(crate) fn chunk_file_name(id: u32) -> String {
    format!("chunk-{:06}", id)
}

/// A durable, install-ready snapshot
#[derive(Debug, Clone)]
pub struct PersistedSnapshot {
    id: SnapshotId,
    dir: PathBuf,
    meta: SnapshotMeta,
}

impl PersistedSnapshot {
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn index(&self) -> u64 {
        self.id.index
    }

    pub fn term(&self) -> tern_core::Term {
        self.id.term
    }

    pub fn chunk_count(&self) -> u32 {
        self.meta.chunk_count
    }

    pub fn size_bytes(&self) -> u64 {
        self.meta.size_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read one chunk back for transfer, verifying its stored checksum
    pub fn chunk(&self, id: u32) -> Result<SnapshotChunk, SnapshotError> {
        if id >= self.meta.chunk_count {
            return Err(SnapshotError::NotFound(format!(
                "chunk {} of {}",
                id, self.id
            )));
        }
        let payload = fs::read(self.dir.join(chunk_file_name(id)))?;
        if crc32fast::hash(&payload) != self.meta.checksums[id as usize] {
            return Err(SnapshotError::ChunkChecksumMismatch { chunk: id });
        }
        let last = id + 1 == self.meta.chunk_count;
        Ok(SnapshotChunk::new(self.id, id, payload, last))
    }

    /// Concatenate all chunks back into the snapshot's content
    pub fn read_all(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut content = Vec::with_capacity(self.meta.size_bytes as usize);
        for n in 0..self.meta.chunk_count {
            content.extend_from_slice(&self.chunk(n)?.payload);
        }
        Ok(content)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
