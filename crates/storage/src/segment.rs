// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single fixed-capacity append-only segment file
//!
//! Records are newline-delimited JSON frames. A segment is written only
//! at its tail; reads open a separate handle and scan forward from the
//! nearest sparse-index sample.

use crate::error::StorageError;
use crate::frame::SegmentRecord;
use crate::index::SparseIndex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tern_core::{LogEntry, Term};

/// One segment of the partition log
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    file: File,
    first_index: u64,
    next_index: u64,
    last_term: Term,
    size: u64,
    capacity: u64,
    index: SparseIndex,
}

impl Segment {
    /// Create a fresh, empty segment whose first record will be `first_index`
    pub fn create(
        path: &Path,
        first_index: u64,
        capacity: u64,
        index_interval: u64,
    ) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            first_index,
            next_index: first_index,
            last_term: Term::ZERO,
            size: 0,
            capacity,
            index: SparseIndex::new(index_interval),
        })
    }

    /// Open an existing segment, scanning and validating every record.
    ///
    /// `first_index` is the index the segment's file name declares. A
    /// checksum mismatch or a gap in indices fails the open. Unparseable
    /// trailing data is tolerated only when `allow_torn_tail` is set (the
    /// log store sets it for the final segment, where a crash mid-write
    /// leaves a partial last line); the tail is then truncated away.
    pub fn open(
        path: &Path,
        first_index: u64,
        capacity: u64,
        index_interval: u64,
        allow_torn_tail: bool,
    ) -> Result<Self, StorageError> {
        let segment_name = file_name(path);
        let mut index = SparseIndex::new(index_interval);
        let mut next_index = first_index;
        let mut last_term = Term::ZERO;
        let mut last_valid_position: u64 = 0;
        let mut torn = false;

        {
            let reader = File::open(path)?;
            let mut lines = BufReader::new(reader);
            let mut position: u64 = 0;

            loop {
                let mut line = String::new();
                let bytes_read = lines.read_line(&mut line)?;
                if bytes_read == 0 {
                    break;
                }

                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    position += bytes_read as u64;
                    continue;
                }

                let record = match SegmentRecord::from_line(trimmed) {
                    Ok(r) => r,
                    Err(e) => {
                        if allow_torn_tail && lines.fill_buf()?.is_empty() {
                            torn = true;
                            break;
                        }
                        return Err(StorageError::CorruptSegment {
                            segment: segment_name,
                            index: next_index,
                            reason: e.to_string(),
                        });
                    }
                };

                if !record.verify() {
                    return Err(StorageError::ChecksumMismatch {
                        index: record.index,
                    });
                }
                if record.index != next_index {
                    return Err(StorageError::CorruptSegment {
                        segment: segment_name,
                        index: record.index,
                        reason: format!("expected index {}", next_index),
                    });
                }

                index.maybe_note(record.index, position);
                last_term = record.term;
                next_index += 1;
                position += bytes_read as u64;
                last_valid_position = position;
            }
        }

        if torn {
            tracing::warn!(
                segment = %segment_name,
                position = last_valid_position,
                "dropping torn record at segment tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(last_valid_position)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            first_index,
            next_index,
            last_term,
            size: last_valid_position,
            capacity,
            index,
        })
    }

    /// Append one entry at the segment tail.
    ///
    /// Returns [`StorageError::SegmentFull`] when the record does not fit
    /// the remaining capacity; the caller rolls to a new segment. A record
    /// bigger than a whole segment is rejected as
    /// [`StorageError::RecordTooLarge`].
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), StorageError> {
        if entry.index != self.next_index {
            return Err(StorageError::NonContiguousAppend {
                index: entry.index,
                last: self.next_index.saturating_sub(1),
            });
        }

        let record = SegmentRecord::from_entry(entry);
        let line = record.to_line()?;
        let bytes = line.len() as u64 + 1;

        if bytes > self.capacity {
            return Err(StorageError::RecordTooLarge {
                bytes,
                capacity: self.capacity,
            });
        }
        if !self.is_empty() && self.size + bytes > self.capacity {
            return Err(StorageError::SegmentFull);
        }

        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;

        self.index.maybe_note(entry.index, self.size);
        self.size += bytes;
        self.last_term = entry.term;
        self.next_index += 1;
        Ok(())
    }

    /// Fsync the segment file
    pub fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Read the entry at `index`, if this segment holds it
    pub fn entry(&self, index: u64) -> Result<Option<LogEntry>, StorageError> {
        if index < self.first_index || index >= self.next_index {
            return Ok(None);
        }
        let mut found = None;
        self.scan_from(index, |record| {
            if record.index == index {
                found = Some(record.into_entry());
                false
            } else {
                record.index < index
            }
        })?;
        Ok(found)
    }

    /// Read entries with indices in `[from, to]`, clamped to this segment
    pub fn read_range(&self, from: u64, to: u64) -> Result<Vec<LogEntry>, StorageError> {
        let from = from.max(self.first_index);
        let to = to.min(self.next_index.saturating_sub(1));
        if self.is_empty() || from > to {
            return Ok(Vec::new());
        }
        let mut entries = Vec::with_capacity((to - from + 1) as usize);
        self.scan_from(from, |record| {
            let index = record.index;
            if index >= from && index <= to {
                entries.push(record.into_entry());
            }
            index < to
        })?;
        Ok(entries)
    }

    /// Remove all records at or above `index`
    pub fn truncate_from(&mut self, index: u64) -> Result<(), StorageError> {
        if index >= self.next_index {
            return Ok(());
        }
        let cut = index.max(self.first_index);

        let mut position = self.index.position_before(cut);
        {
            let mut reader = BufReader::new(File::open(&self.path)?);
            reader.seek(SeekFrom::Start(position))?;
            loop {
                let mut line = String::new();
                let bytes_read = reader.read_line(&mut line)?;
                if bytes_read == 0 {
                    break;
                }
                let record = SegmentRecord::from_line(line.trim_end())?;
                if record.index >= cut {
                    break;
                }
                position += bytes_read as u64;
            }
        }

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(position)?;
        file.sync_all()?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.size = position;
        self.next_index = cut;
        self.index.truncate_from(cut);
        self.last_term = match cut.checked_sub(1) {
            Some(prev) if prev >= self.first_index => self
                .entry(prev)?
                .map(|e| e.term)
                .unwrap_or(Term::ZERO),
            _ => Term::ZERO,
        };
        Ok(())
    }

    /// Delete the segment's backing file
    pub fn remove(self) -> Result<(), StorageError> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Index of the last record, or `None` when empty
    pub fn last_index(&self) -> Option<u64> {
        self.next_index.checked_sub(1).filter(|i| *i >= self.first_index)
    }

    /// Term of the last record; meaningful only when non-empty
    pub fn last_term(&self) -> Term {
        self.last_term
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == self.first_index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan records starting near `index`, invoking `visit` until it
    /// returns false or the segment ends. Records are checksum-verified.
    fn scan_from<F>(&self, index: u64, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(SegmentRecord) -> bool,
    {
        let position = self.index.position_before(index);
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(position))?;

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record = SegmentRecord::from_line(&line)?;
            if !record.verify() {
                return Err(StorageError::ChecksumMismatch {
                    index: record.index,
                });
            }
            if !visit(record) {
                break;
            }
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[path = "segment_tests.rs"]
mod tests;
