//! Shardio Data - Shard lifecycle layer
//!
//! This crate implements the shard abstraction and everything that keeps
//! it hot:
//! - The striped reference-counting guard for lock-free read lifetimes
//! - The ordered KV abstraction and its redb-backed implementation
//! - Delta part intake behind the processing-principal boundary
//! - The background merge pipeline draining the sequential store
//! - Live shards (merge/retention/condense/compact/snapshot writing)
//! - Snapshot shards with time-bounded background rotation that never
//!   blocks concurrent readers

pub mod db;
pub mod guard;
pub mod merge;
pub mod part_destination;
pub mod paths;
pub mod shard;
pub mod snapshot;
pub mod transfer;

// Re-exports
pub use db::{DB_FILE_NAME, DbFactory, RedbDb, ShardDb, redb_factory};
pub use guard::Guard;
pub use merge::MergeProcessor;
pub use part_destination::PartDestination;
pub use paths::StatePaths;
pub use shard::{LiveShard, Shard, SnapshotStatus};
pub use snapshot::SnapshotShard;
pub use transfer::{FileTransferClient, serve_snapshot};
