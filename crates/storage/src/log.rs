// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segmented log store for one partition
//!
//! Segment files are named by the index of their first record and opened
//! in order on restart. A new segment rolls open when the active one is
//! full. Truncation serves consensus conflict resolution only and never
//! reaches at or below the commit floor; compaction removes whole
//! segments covered by a persisted snapshot.

use crate::error::StorageError;
use crate::segment::Segment;
use std::path::{Path, PathBuf};
use tern_core::{LogEntry, StorageConfig, Term};
use tracing::{debug, info, warn};

/// Append-only replicated log storage
#[derive(Debug)]
pub struct SegmentedLog {
    dir: PathBuf,
    config: StorageConfig,
    /// Ordered by first index; never empty after open
    segments: Vec<Segment>,
    /// Highest index known committed; truncation below this is refused
    commit_floor: u64,
    /// Index/term pair of the latest snapshot that compacted the log.
    /// Serves as the consistency-check anchor for the first entry.
    baseline_index: u64,
    baseline_term: Term,
}

impl SegmentedLog {
    /// Open the log in `dir`, scanning and validating all segments.
    ///
    /// Fails on any checksum mismatch or index gap; only a torn record at
    /// the very tail of the final segment is dropped. A corrupt log must
    /// be recovered from a snapshot plus replication, not opened.
    pub fn open(dir: &Path, config: StorageConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;

        let mut firsts = Vec::new();
        for dir_entry in std::fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.extension().map(|e| e == "seg").unwrap_or(false) {
                if let Some(first) = parse_first_index(&path) {
                    firsts.push((first, path));
                }
            }
        }
        firsts.sort_by_key(|(first, _)| *first);

        let mut segments: Vec<Segment> = Vec::with_capacity(firsts.len());
        let count = firsts.len();
        for (n, (first, path)) in firsts.into_iter().enumerate() {
            let last = n + 1 == count;
            let segment = Segment::open(
                &path,
                first,
                config.segment_capacity,
                config.index_interval,
                last,
            )?;

            if let Some(prev) = segments.last() {
                let expected = prev.last_index().map(|i| i + 1).unwrap_or(prev.first_index());
                if segment.first_index() != expected {
                    return Err(StorageError::CorruptSegment {
                        segment: path.display().to_string(),
                        index: segment.first_index(),
                        reason: format!("expected segment to start at {}", expected),
                    });
                }
            }
            segments.push(segment);
        }

        let mut log = Self {
            dir: dir.to_path_buf(),
            config,
            segments,
            commit_floor: 0,
            baseline_index: 0,
            baseline_term: Term::ZERO,
        };

        if log.segments.is_empty() {
            log.roll(1)?;
        }

        info!(
            dir = %dir.display(),
            segments = log.segments.len(),
            last_index = log.last_index(),
            "opened segmented log"
        );
        Ok(log)
    }

    /// Append a batch of contiguous entries, rolling segments as needed.
    ///
    /// Returns the last appended index. The batch is fsynced before
    /// returning when `sync_on_append` is set.
    pub fn append(&mut self, entries: &[LogEntry]) -> Result<u64, StorageError> {
        let mut last = self.last_index();
        for entry in entries {
            if entry.index != last + 1 {
                return Err(StorageError::NonContiguousAppend {
                    index: entry.index,
                    last,
                });
            }
            if !entry.verify() {
                return Err(StorageError::ChecksumMismatch { index: entry.index });
            }

            match self.active().append(entry) {
                Ok(()) => {}
                Err(StorageError::SegmentFull) => {
                    // Roll to a fresh segment and retry the same entry
                    self.active().sync()?;
                    self.roll(entry.index)?;
                    self.active().append(entry)?;
                }
                Err(e) => return Err(e),
            }
            last = entry.index;
        }

        if self.config.sync_on_append && !entries.is_empty() {
            self.active().sync()?;
        }
        Ok(last)
    }

    /// Read the entry at `index`, if present
    pub fn entry(&self, index: u64) -> Result<Option<LogEntry>, StorageError> {
        match self.locate(index) {
            Some(segment) => segment.entry(index),
            None => Ok(None),
        }
    }

    /// Term of the entry at `index`.
    ///
    /// Index 0 and the compaction baseline resolve without a log read;
    /// compacted indices resolve to `None`.
    pub fn term_at(&self, index: u64) -> Result<Option<Term>, StorageError> {
        if index == 0 {
            return Ok(Some(Term::ZERO));
        }
        if index == self.baseline_index {
            return Ok(Some(self.baseline_term));
        }
        Ok(self.entry(index)?.map(|e| e.term))
    }

    /// Read entries with indices in `[from, to]`, in order
    pub fn range(&self, from: u64, to: u64) -> Result<Vec<LogEntry>, StorageError> {
        let mut entries = Vec::new();
        if from > to {
            return Ok(entries);
        }
        for segment in &self.segments {
            let Some(seg_last) = segment.last_index() else {
                continue;
            };
            if seg_last < from || segment.first_index() > to {
                continue;
            }
            entries.extend(segment.read_range(from, to)?);
        }
        Ok(entries)
    }

    /// Remove all entries at or above `index`.
    ///
    /// Triggered solely by consensus-driven conflict resolution; refuses
    /// to reach committed entries or entries below the snapshot boundary.
    pub fn truncate_from(&mut self, index: u64) -> Result<(), StorageError> {
        if index <= self.commit_floor {
            return Err(StorageError::TruncateBelowCommit {
                index,
                floor: self.commit_floor,
            });
        }
        if index <= self.baseline_index {
            return Err(StorageError::TruncateBelowBoundary {
                index,
                boundary: self.baseline_index,
            });
        }
        if index > self.last_index() {
            return Ok(());
        }

        warn!(index, "truncating divergent log suffix");

        // Drop whole segments that start at or above the cut
        while let Some(segment) = self.segments.last() {
            if self.segments.len() > 1 && segment.first_index() >= index {
                let segment = match self.segments.pop() {
                    Some(s) => s,
                    None => break,
                };
                segment.remove()?;
            } else {
                break;
            }
        }

        self.active().truncate_from(index)?;
        Ok(())
    }

    /// Remove whole segments entirely covered by a persisted snapshot at
    /// `index`/`term`. Never removes a segment holding an entry above
    /// `index`, and always keeps the active segment.
    pub fn compact_below(&mut self, index: u64, term: Term) -> Result<usize, StorageError> {
        let mut removed = 0;
        while self.segments.len() > 1 {
            let covered = self.segments[0]
                .last_index()
                .map(|last| last <= index)
                .unwrap_or(false);
            if !covered {
                break;
            }
            let segment = self.segments.remove(0);
            debug!(path = %segment.path().display(), "removing compacted segment");
            segment.remove()?;
            removed += 1;
        }

        if index > self.baseline_index {
            self.baseline_index = index;
            self.baseline_term = term;
        }
        self.commit_floor = self.commit_floor.max(index);

        if removed > 0 {
            info!(removed, below = index, "compacted log segments");
        }
        Ok(removed)
    }

    /// Discard the whole log and restart it just above a snapshot.
    ///
    /// Used when a received snapshot replaces local state: the local log
    /// is no longer a prefix of the leader's.
    pub fn reset(&mut self, index: u64, term: Term) -> Result<(), StorageError> {
        info!(index, "resetting log to snapshot boundary");
        for segment in self.segments.drain(..) {
            segment.remove()?;
        }
        self.baseline_index = index;
        self.baseline_term = term;
        self.commit_floor = self.commit_floor.max(index);
        self.roll(index + 1)?;
        Ok(())
    }

    /// Reconcile the log with the latest persisted snapshot at startup.
    ///
    /// If the snapshot is ahead of the log, or entries between the
    /// snapshot and the log's first index are missing, the log restarts
    /// above the snapshot.
    pub fn align_with_snapshot(&mut self, index: u64, term: Term) -> Result<(), StorageError> {
        self.commit_floor = self.commit_floor.max(index);
        if index > self.baseline_index {
            self.baseline_index = index;
            self.baseline_term = term;
        }

        let has_entries = self.segments.iter().any(|s| !s.is_empty());
        let needs_reset = if has_entries {
            self.last_index() < index || self.first_index() > index + 1
        } else {
            self.first_index() != index + 1
        };
        if needs_reset {
            self.reset(index, term)?;
        }
        Ok(())
    }

    /// Raise the commit floor; committed entries are never truncated
    pub fn set_commit_floor(&mut self, index: u64) {
        self.commit_floor = self.commit_floor.max(index);
    }

    /// Index of the first entry still present
    pub fn first_index(&self) -> u64 {
        self.segments
            .first()
            .map(|s| s.first_index())
            .unwrap_or(self.baseline_index + 1)
    }

    /// Index of the last entry, or the snapshot baseline when empty
    pub fn last_index(&self) -> u64 {
        self.segments
            .iter()
            .rev()
            .find_map(|s| s.last_index())
            .unwrap_or(self.baseline_index)
    }

    /// Term of the last entry, or the baseline term when empty
    pub fn last_term(&self) -> Term {
        self.segments
            .iter()
            .rev()
            .find(|s| !s.is_empty())
            .map(|s| s.last_term())
            .unwrap_or(self.baseline_term)
    }

    pub fn commit_floor(&self) -> u64 {
        self.commit_floor
    }

    /// Latest snapshot boundary the log was compacted or reset to
    pub fn baseline(&self) -> (u64, Term) {
        (self.baseline_index, self.baseline_term)
    }

    /// Fsync the active segment
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.active().sync()
    }

    /// Flush and close the log
    pub fn close(mut self) -> Result<(), StorageError> {
        self.flush()
    }

    #[cfg(test)]
    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn active(&mut self) -> &mut Segment {
        // Invariant: `segments` is non-empty after open
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    fn locate(&self, index: u64) -> Option<&Segment> {
        if index == 0 {
            return None;
        }
        let at = self.segments.partition_point(|s| s.first_index() <= index);
        at.checked_sub(1).map(|i| &self.segments[i])
    }

    fn roll(&mut self, first_index: u64) -> Result<(), StorageError> {
        let path = self.dir.join(segment_file_name(first_index));
        debug!(path = %path.display(), "rolling to new segment");
        let segment = Segment::create(
            &path,
            first_index,
            self.config.segment_capacity,
            self.config.index_interval,
        )?;
        self.segments.push(segment);
        Ok(())
    }
}

fn segment_file_name(first_index: u64) -> String {
    format!("{:020}.seg", first_index)
}

fn parse_first_index(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
