//! Shardio Store - Sharded directory layout and sequenced delta queue
//!
//! This crate implements the durable intake side of the shard pipeline:
//! - The id-to-path sharding scheme that bounds directory fan-out to 1000
//!   children per directory
//! - The append-only, strictly ordered delta file store with
//!   blocking-wait-for-next-id consumption, crash-safe atomic renames and
//!   bottom-up directory pruning
//! - The one-shot completion latch used for synchronous merges

pub mod dir_util;
pub mod latch;
pub mod sequential;

// Re-exports
pub use latch::CompletionLatch;
pub use sequential::{STORE_EXTENSION, SequentialFile, SequentialFileStore};
