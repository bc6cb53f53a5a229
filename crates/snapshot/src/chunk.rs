// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot identity and transfer chunks

use serde::{Deserialize, Serialize};
use std::fmt;

use tern_core::Term;

/// Identifies a snapshot by the log position it covers.
///
/// A snapshot summarizes all entries up to and including `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId {
    pub index: u64,
    pub term: Term,
}

impl SnapshotId {
    pub fn new(index: u64, term: Term) -> Self {
        Self { index, term }
    }

    /// Directory name of the persisted snapshot
    pub fn dir_name(&self) -> String {
        format!("{:020}-{}", self.index, self.term.0)
    }

    /// Parse a persisted snapshot directory name
    pub fn parse(name: &str) -> Option<Self> {
        let (index, term) = name.split_once('-')?;
        Some(Self {
            index: index.parse().ok()?,
            term: Term(term.parse().ok()?),
        })
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.term)
    }
}

/// One unit of a chunked snapshot transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotChunk {
    pub snapshot: SnapshotId,
    /// Zero-based position in the transfer
    pub id: u32,
    pub payload: Vec<u8>,
    /// CRC32 of the payload
    pub checksum: u32,
    /// True for the final chunk of the snapshot
    pub last: bool,
}

impl SnapshotChunk {
    /// Create a chunk with a computed checksum
    pub fn new(snapshot: SnapshotId, id: u32, payload: Vec<u8>, last: bool) -> Self {
        let checksum = crc32fast::hash(&payload);
        Self {
            snapshot,
            id,
            payload,
            checksum,
            last,
        }
    }

    /// Verify the checksum matches the payload
    pub fn verify(&self) -> bool {
        self.checksum == crc32fast::hash(&self.payload)
    }
}

#[cfg(test)]
#[path = "chunk_tests.rs"]
mod tests;
