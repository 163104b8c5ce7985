//! Shardio Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, content hashing and
//! configuration used across all Shardio components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::ContentHasher;
pub use config::ShardConfig;
pub use error::{Error, Result};
pub use types::*;

/// Current time as epoch milliseconds.
///
/// Clamps to 0 if the system clock is before the epoch.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
