//! Core type definitions for Shardio
//!
//! This module defines the fundamental types used throughout the system:
//! shard document references, delta part descriptors and the caller
//! principal used at the permission boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Reference to the document that owns a shard.
///
/// Shards are keyed by the owning document's UUID; the name is carried for
/// logging and info output only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardDoc {
    /// Stable unique identifier of the owning document
    pub uuid: String,
    /// Human-readable name
    pub name: String,
}

impl ShardDoc {
    /// Create a new document reference
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ShardDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Identifies one inbound delta part.
///
/// Parts are content-addressed: `file_hash` is the lowercase hex SHA-256 of
/// the file content and is verified on receipt before the part enters the
/// sequential store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Creation time of the part on the sending node (epoch millis)
    pub create_time_ms: u64,
    /// Metadata id of the part on the sending node
    pub meta_id: u64,
    /// Lowercase hex SHA-256 of the file content
    pub file_hash: String,
}

impl FileDescriptor {
    /// Create a new descriptor
    pub fn new(create_time_ms: u64, meta_id: u64, file_hash: impl Into<String>) -> Self {
        Self {
            create_time_ms,
            meta_id,
            file_hash: file_hash.into(),
        }
    }
}

/// Descriptive metadata for a part plus its concrete location.
///
/// Used only for logging.
#[derive(Clone, Debug)]
pub struct FileInfo {
    pub descriptor: FileDescriptor,
    pub path: PathBuf,
}

impl FileInfo {
    #[must_use]
    pub fn new(descriptor: FileDescriptor, path: PathBuf) -> Self {
        Self { descriptor, path }
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "part metaId={} createTime={} hash={} path={}",
            self.descriptor.meta_id,
            self.descriptor.create_time_ms,
            self.descriptor.file_hash,
            self.path.display()
        )
    }
}

/// Request to fetch a snapshot of a shard from a peer node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// UUID of the document whose shard is wanted
    pub doc_uuid: String,
    /// Earliest effective time the snapshot must cover (epoch millis)
    pub range_start_ms: u64,
    /// Snapshot time the requester already holds, if any; lets the remote
    /// node answer "unchanged" cheaply
    pub previous_snapshot_time_ms: Option<u64>,
}

impl SnapshotRequest {
    pub fn new(
        doc_uuid: impl Into<String>,
        range_start_ms: u64,
        previous_snapshot_time_ms: Option<u64>,
    ) -> Self {
        Self {
            doc_uuid: doc_uuid.into(),
            range_start_ms,
            previous_snapshot_time_ms,
        }
    }
}

/// Caller identity at the part-receive and snapshot-fetch boundary.
///
/// Only processing principals may push parts or fetch snapshots; everything
/// else is rejected before any state is touched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name, for logging
    pub name: String,
    processing: bool,
}

impl Principal {
    /// Create a processing principal (inter-node service identity)
    pub fn processing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processing: true,
        }
    }

    /// Create an ordinary user principal
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processing: false,
        }
    }

    /// True if this principal may use processing-level entry points
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing
    }
}
