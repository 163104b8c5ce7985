//! Snapshot transfer boundary
//!
//! Fetching a snapshot from a peer node is an opaque remote operation;
//! the HTTP/RPC plumbing lives with the caller. Implementations populate
//! the destination directory with a complete database image and return
//! the snapshot's creation time. [`serve_snapshot`] is the answering
//! side a transport delegates to on the node that owns the live shard.

use crate::shard::{Shard, SnapshotStatus};
use shardio_common::error::{Error, Result};
use shardio_common::types::{Principal, SnapshotRequest};
use std::fs;
use std::path::Path;
use tracing::info;

/// Client side of the inter-node snapshot transfer
pub trait FileTransferClient: Send + Sync {
    /// Fetch a snapshot of the requested document's shard from `node`
    /// into `destination`, returning the snapshot time (epoch millis).
    fn fetch_snapshot(
        &self,
        node: &str,
        request: &SnapshotRequest,
        destination: &Path,
    ) -> Result<u64>;
}

/// Answer a snapshot fetch against a local shard.
///
/// Requires a processing principal; fails with no side effects otherwise.
/// A requester that already holds the latest snapshot gets a fetch
/// failure rather than a redundant copy, which its rotation logic turns
/// into a plain retry backoff.
pub fn serve_snapshot(
    principal: &Principal,
    shard: &Shard,
    request: &SnapshotRequest,
    destination: &Path,
) -> Result<u64> {
    if !principal.is_processing() {
        return Err(Error::PermissionDenied);
    }
    let status = shard.check_snapshot_status(request)?;
    let SnapshotStatus::Available { .. } = status else {
        return Err(Error::fetch_failed(
            "requester already holds the latest snapshot",
        ));
    };
    let Shard::Live(live) = shard else {
        return Err(Error::unsupported(
            "snapshot shards cannot serve snapshots",
        ));
    };
    let Some((snapshot_time_ms, snapshot_dir)) = live.latest_snapshot_dir() else {
        return Err(Error::fetch_failed("no snapshot available"));
    };
    copy_dir_contents(&snapshot_dir, destination)?;
    info!(doc = %shard.get_doc(), snapshot_time_ms, destination = %destination.display(),
        "served snapshot");
    Ok(snapshot_time_ms)
}

fn copy_dir_contents(source: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_contents(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
