// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable Raft metadata: current term and vote
//!
//! The consensus core must not grant a vote or adopt a term before the
//! record is on disk, or a restart could double-vote within one term.
//! Writes go through a temp file and an atomic rename.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tern_core::{MemberId, Term};

/// The per-replica consensus state that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftMetadata {
    pub term: Term,
    pub voted_for: Option<MemberId>,
}

/// Stores [`RaftMetadata`] in a single JSON file
pub struct MetaStore {
    path: PathBuf,
}

impl MetaStore {
    /// Open the metadata store inside `dir`
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("meta.json"),
        })
    }

    /// Load the persisted metadata; a missing file yields the default
    pub fn load(&self) -> Result<RaftMetadata, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RaftMetadata::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Durably replace the metadata (fsync, then atomic rename)
    pub fn store(&self, meta: &RaftMetadata) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(serde_json::to_string(meta)?.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
