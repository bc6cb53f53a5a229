// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk record framing for log segments
//!
//! Each segment line is one serialized record carrying the entry's
//! index, term, payload length, and checksum, so truncated writes and
//! corruption are detectable on read.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use tern_core::{LogEntry, Term};

/// One durable record in a segment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub index: u64,
    pub term: Term,
    /// Payload length, validated against the payload on read
    pub len: u32,
    /// CRC32 over index, term, and payload
    pub checksum: u32,
    pub payload: Vec<u8>,
}

impl SegmentRecord {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            index: entry.index,
            term: entry.term,
            len: entry.payload.len() as u32,
            checksum: entry.checksum,
            payload: entry.payload.clone(),
        }
    }

    pub fn into_entry(self) -> LogEntry {
        LogEntry {
            index: self.index,
            term: self.term,
            payload: self.payload,
            checksum: self.checksum,
        }
    }

    /// Verify length and checksum against the payload
    pub fn verify(&self) -> bool {
        if self.len as usize != self.payload.len() {
            return false;
        }
        LogEntry {
            index: self.index,
            term: self.term,
            payload: self.payload.clone(),
            checksum: self.checksum,
        }
        .verify()
    }

    /// Serialize to newline-delimited JSON (one line)
    pub fn to_line(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(StorageError::from)
    }

    /// Parse from a single line of JSON
    pub fn from_line(line: &str) -> Result<Self, StorageError> {
        serde_json::from_str(line).map_err(StorageError::from)
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
