//! tern-core: Shared types for the Tern replicated log
//!
//! This crate provides:
//! - Identifiers for partitions and their members
//! - Terms, log entries, and their integrity checksums
//! - Wire message types for the consensus protocol
//! - Configuration for storage, consensus, and snapshotting

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod entry;
pub mod id;
pub mod message;
pub mod term;

// Re-exports
pub use config::{PartitionConfig, RaftConfig, SnapshotConfig, StorageConfig};
pub use entry::LogEntry;
pub use id::{MemberId, PartitionId};
pub use message::{
    AdminRequest, AdminRequestKind, AdminResponse, AppendRequest, AppendResponse, InstallRequest,
    InstallResponse, VoteRequest, VoteResponse,
};
pub use term::Term;
