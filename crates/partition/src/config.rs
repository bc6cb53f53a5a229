// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration resolution for partition bootstrap
//!
//! Where the configuration comes from (files, environment, an operator)
//! is not this crate's concern; bootstrap only needs something that can
//! answer these two questions, and may fail doing so.

use std::path::PathBuf;
use tern_core::{PartitionConfig, PartitionId};
use thiserror::Error;

/// A configuration lookup failed
#[derive(Debug, Error)]
#[error("configuration unavailable: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Resolves a partition's configuration at bootstrap.
///
/// Failures here must surface through the bootstrap future, never as a
/// synchronous escape out of `bootstrap` itself.
pub trait ConfigProvider: Send + Sync {
    fn partition_config(&self, partition: PartitionId) -> Result<PartitionConfig, ConfigError>;

    /// Directory holding the partition's segments, metadata, and snapshots
    fn data_dir(&self, partition: PartitionId) -> Result<PathBuf, ConfigError>;
}

/// Fixed configuration, the common case outside of tests for a single
/// statically configured broker
pub struct StaticConfig {
    pub config: PartitionConfig,
    pub root_dir: PathBuf,
}

impl ConfigProvider for StaticConfig {
    fn partition_config(&self, _partition: PartitionId) -> Result<PartitionConfig, ConfigError> {
        Ok(self.config.clone())
    }

    fn data_dir(&self, partition: PartitionId) -> Result<PathBuf, ConfigError> {
        Ok(self.root_dir.join(format!("partition-{partition}")))
    }
}
