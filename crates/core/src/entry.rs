// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entries with checksum verification
//!
//! Each entry carries a CRC32 checksum over its index, term, and payload
//! so corruption is detectable wherever the entry is read back.

use crate::term::Term;
use serde::{Deserialize, Serialize};

/// A single entry in the replicated log.
///
/// Indices are strictly increasing per partition and never reused. An
/// entry is immutable once committed; it is removed only by compaction
/// after a persisted snapshot covers its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the partition's log
    pub index: u64,
    /// Term under which the entry was appended
    pub term: Term,
    /// Opaque record supplied by the appending client
    pub payload: Vec<u8>,
    /// CRC32 over index, term, and payload
    pub checksum: u32,
}

impl LogEntry {
    /// Create a new entry with a computed checksum
    pub fn new(index: u64, term: Term, payload: Vec<u8>) -> Self {
        let checksum = Self::calculate_checksum(index, term, &payload);
        Self {
            index,
            term,
            payload,
            checksum,
        }
    }

    fn calculate_checksum(index: u64, term: Term, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&index.to_be_bytes());
        hasher.update(&term.0.to_be_bytes());
        hasher.update(payload);
        hasher.finalize()
    }

    /// Verify the checksum matches the entry contents
    pub fn verify(&self) -> bool {
        self.checksum == Self::calculate_checksum(self.index, self.term, &self.payload)
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
