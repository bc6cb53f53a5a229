// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Election terms

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing election epoch.
///
/// A replica never acts on a message carrying a term lower than its own
/// current term without rejecting it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Term(pub u64);

impl Term {
    pub const ZERO: Term = Term(0);

    /// The term that follows this one
    pub fn next(self) -> Term {
        Term(self.0 + 1)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "term_tests.rs"]
mod tests;
