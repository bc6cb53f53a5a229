// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow-controlled append pipeline
//!
//! Bounds how many submitted-but-uncommitted entries exist at once.
//! Capacity is taken by [`AppendPipeline::try_acquire`] and returned
//! only when the permit reports one of its three terminal outcomes, so
//! a slow quorum backpressures producers instead of queuing unbounded
//! work. Saturation is a normal signal, not an error.

use crate::error::RaftError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Callbacks reporting the terminal outcome of one append.
///
/// Exactly one of the three fires per permit.
pub trait AppendListener: Send + 'static {
    /// The entry was committed by a quorum at `index`
    fn on_commit(&mut self, index: u64);
    /// The local write failed; the entry never entered the log
    fn on_write_error(&mut self, error: RaftError);
    /// The entry was written locally but replication or commitment failed
    fn on_commit_error(&mut self, index: u64, error: RaftError);
}

/// Bounded admission into the append path
#[derive(Clone, Debug)]
pub struct AppendPipeline {
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl AppendPipeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take one unit of capacity, or `None` when saturated.
    ///
    /// The caller retries later; capacity recovers as soon as any
    /// outstanding append reaches a terminal callback.
    pub fn try_acquire(&self, listener: Box<dyn AppendListener>) -> Option<AppendPermit> {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        Some(AppendPermit {
            in_flight: Arc::clone(&self.in_flight),
            listener: Some(listener),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// One in-flight append: a capacity token plus the listener to notify.
///
/// Consumed by exactly one terminal call; dropping it without one still
/// returns the capacity, so a lost permit cannot wedge the pipeline.
pub struct AppendPermit {
    in_flight: Arc<AtomicUsize>,
    listener: Option<Box<dyn AppendListener>>,
}

impl AppendPermit {
    /// Report quorum commitment at `index`
    pub fn on_commit(mut self, index: u64) {
        if let Some(mut listener) = self.listener.take() {
            listener.on_commit(index);
        }
    }

    /// Report a failed local write; the entry was never appended
    pub fn on_write_error(mut self, error: RaftError) {
        if let Some(mut listener) = self.listener.take() {
            listener.on_write_error(error);
        }
    }

    /// Report a replication or commitment failure after a local write
    pub fn on_commit_error(mut self, index: u64, error: RaftError) {
        if let Some(mut listener) = self.listener.take() {
            listener.on_commit_error(index, error);
        }
    }

    /// Give the capacity back without any callback (submission never
    /// reached the consensus actor)
    pub(crate) fn release(mut self) {
        self.listener.take();
    }
}

impl Drop for AppendPermit {
    fn drop(&mut self) {
        if self.listener.is_some() {
            warn!("append permit dropped without a terminal callback");
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
