//! Shard variants and their capability surface
//!
//! A shard is either live (locally written, fed by the merge pipeline) or
//! a snapshot replica (read-only, fetched from a peer and rotated in the
//! background). Dispatch is a tagged union rather than a trait object so
//! the read path can stay generic over the caller's closure.

use crate::db::{DbFactory, ShardDb};
use crate::paths::StatePaths;
use crate::snapshot::SnapshotShard;
use parking_lot::Mutex;
use shardio_common::error::{Error, Result};
use shardio_common::now_millis;
use shardio_common::types::{ShardDoc, SnapshotRequest};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Outcome of a snapshot currency check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// The caller already holds the latest snapshot
    Unchanged,
    /// A newer snapshot is available
    Available { snapshot_time_ms: u64 },
}

/// A shard: live or snapshot-backed
pub enum Shard {
    Live(LiveShard),
    Snapshot(SnapshotShard),
}

impl Shard {
    /// The owning document
    pub fn get_doc(&self) -> &ShardDoc {
        match self {
            Self::Live(shard) => shard.get_doc(),
            Self::Snapshot(shard) => shard.get_doc(),
        }
    }

    /// Run a read action against the shard's current database.
    ///
    /// Never blocks on snapshot staleness; a snapshot shard serves the
    /// best available data and triggers rotation in the background.
    pub fn get<R>(&self, action: impl Fn(&dyn ShardDb) -> Result<R>) -> Result<R> {
        match self {
            Self::Live(shard) => shard.get(action),
            Self::Snapshot(shard) => shard.get(action),
        }
    }

    /// Descriptive info string (JSON)
    pub fn get_info(&self) -> Result<String> {
        match self {
            Self::Live(shard) => shard.get_info(),
            Self::Snapshot(shard) => shard.get_info(),
        }
    }

    /// Merge a delta database into the shard.
    ///
    /// Fails on a snapshot shard: replicas must never diverge from their
    /// source, so routing a delta here is a pipeline wiring bug.
    pub fn merge(&self, source: &Path) -> Result<()> {
        match self {
            Self::Live(shard) => shard.merge(source),
            Self::Snapshot(_) => Err(Error::unsupported(
                "merge is not supported on a snapshot shard",
            )),
        }
    }

    /// Apply the retention policy. No-op (0) on snapshot shards.
    pub fn delete_old_data(&self, delete_before_ms: u64, use_state_time: bool) -> Result<u64> {
        match self {
            Self::Live(shard) => shard.delete_old_data(delete_before_ms, use_state_time),
            Self::Snapshot(_) => Ok(0),
        }
    }

    /// Collapse unchanged-value runs. No-op (0) on snapshot shards.
    pub fn condense(&self, condense_before_ms: u64) -> Result<u64> {
        match self {
            Self::Live(shard) => shard.condense(condense_before_ms),
            Self::Snapshot(_) => Ok(0),
        }
    }

    /// Reclaim free space. No-op on snapshot shards.
    pub fn compact(&self) -> Result<()> {
        match self {
            Self::Live(shard) => shard.compact(),
            Self::Snapshot(_) => Ok(()),
        }
    }

    /// Report snapshot currency for a fetch request. Snapshot shards are
    /// replicas and never serve snapshots themselves.
    pub fn check_snapshot_status(&self, request: &SnapshotRequest) -> Result<SnapshotStatus> {
        match self {
            Self::Live(shard) => shard.check_snapshot_status(request),
            Self::Snapshot(_) => Ok(SnapshotStatus::Unchanged),
        }
    }

    /// Write a fresh snapshot for peers to fetch. No-op on snapshot
    /// shards.
    pub fn create_snapshot(&self) -> Result<()> {
        match self {
            Self::Live(shard) => shard.create_snapshot(),
            Self::Snapshot(_) => Ok(()),
        }
    }

    /// Release idle resources (close an idle snapshot database handle)
    pub fn cleanup(&self) -> Result<()> {
        match self {
            Self::Live(_) => Ok(()),
            Self::Snapshot(shard) => shard.cleanup(),
        }
    }

    /// Destroy the shard's data (the owning document was deleted)
    pub fn delete(&self) -> Result<bool> {
        match self {
            Self::Live(shard) => shard.delete(),
            Self::Snapshot(shard) => shard.delete(),
        }
    }
}

/// A locally written shard owning one open database
pub struct LiveShard {
    doc: ShardDoc,
    paths: StatePaths,
    dir: PathBuf,
    db: Arc<dyn ShardDb>,
    // Serializes merge/retention/condense/compact/snapshot writes
    write_lock: Mutex<()>,
    // Time of the latest written snapshot, 0 = none
    snapshot_time_ms: AtomicU64,
}

impl LiveShard {
    /// Open (or create) the live shard for `doc`
    pub fn open(doc: ShardDoc, paths: StatePaths, db_factory: &DbFactory) -> Result<Self> {
        let dir = paths.shard_dir(&doc);
        fs::create_dir_all(&dir)?;
        let db = db_factory(&doc, &dir, false)?;
        let latest = latest_snapshot_time(&paths.snapshot_root(&doc))?;
        info!(doc = %doc, dir = %dir.display(), "opened live shard");
        Ok(Self {
            doc,
            paths,
            dir,
            db,
            write_lock: Mutex::new(()),
            snapshot_time_ms: AtomicU64::new(latest.unwrap_or(0)),
        })
    }

    pub fn get_doc(&self) -> &ShardDoc {
        &self.doc
    }

    pub fn get<R>(&self, action: impl Fn(&dyn ShardDb) -> Result<R>) -> Result<R> {
        action(&*self.db)
    }

    pub fn get_info(&self) -> Result<String> {
        let snapshot_time = self.snapshot_time_ms.load(Ordering::SeqCst);
        let info = serde_json::json!({
            "doc": self.doc.name,
            "uuid": self.doc.uuid,
            "kind": "live",
            "snapshotTime": (snapshot_time != 0).then_some(snapshot_time),
            "db": self.db.info()?,
        });
        Ok(info.to_string())
    }

    pub fn merge(&self, source: &Path) -> Result<()> {
        let _write = self.write_lock.lock();
        self.db.merge(source)
    }

    pub fn delete_old_data(&self, delete_before_ms: u64, use_state_time: bool) -> Result<u64> {
        let _write = self.write_lock.lock();
        self.db.delete_old_data(delete_before_ms, use_state_time)
    }

    pub fn condense(&self, condense_before_ms: u64) -> Result<u64> {
        let _write = self.write_lock.lock();
        self.db.condense(condense_before_ms)
    }

    pub fn compact(&self) -> Result<()> {
        let _write = self.write_lock.lock();
        self.db.compact()?;
        Ok(())
    }

    /// Write a compacted snapshot for peers to fetch and retire
    /// superseded epochs.
    pub fn create_snapshot(&self) -> Result<()> {
        let _write = self.write_lock.lock();
        let time = now_millis().max(self.snapshot_time_ms.load(Ordering::SeqCst) + 1);
        let snapshot_root = self.paths.snapshot_root(&self.doc);
        let dest = snapshot_root.join(time.to_string());
        self.db.write_snapshot(&dest)?;
        self.snapshot_time_ms.store(time, Ordering::SeqCst);
        info!(doc = %self.doc, snapshot_time = time, "created snapshot");

        // Superseded epochs are only useful to in-flight fetches; removal
        // is best effort
        if let Ok(entries) = fs::read_dir(&snapshot_root) {
            for entry in entries.flatten() {
                let is_old = entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<u64>().ok())
                    .is_some_and(|t| t < time);
                if is_old {
                    if let Err(e) = fs::remove_dir_all(entry.path()) {
                        warn!(path = %entry.path().display(), error = %e,
                            "failed to remove superseded snapshot");
                    }
                }
            }
        }
        Ok(())
    }

    /// Currency check for an inbound fetch request. Creates the first
    /// snapshot lazily if none exists yet.
    pub fn check_snapshot_status(&self, request: &SnapshotRequest) -> Result<SnapshotStatus> {
        let mut time = self.snapshot_time_ms.load(Ordering::SeqCst);
        if time == 0 {
            self.create_snapshot()?;
            time = self.snapshot_time_ms.load(Ordering::SeqCst);
        }
        if request.previous_snapshot_time_ms == Some(time) {
            Ok(SnapshotStatus::Unchanged)
        } else {
            Ok(SnapshotStatus::Available {
                snapshot_time_ms: time,
            })
        }
    }

    /// Directory of the latest written snapshot, if any
    pub fn latest_snapshot_dir(&self) -> Option<(u64, PathBuf)> {
        let time = self.snapshot_time_ms.load(Ordering::SeqCst);
        (time != 0).then(|| {
            (
                time,
                self.paths.snapshot_root(&self.doc).join(time.to_string()),
            )
        })
    }

    pub fn delete(&self) -> Result<bool> {
        let _write = self.write_lock.lock();
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        let snapshot_root = self.paths.snapshot_root(&self.doc);
        if snapshot_root.exists() {
            fs::remove_dir_all(&snapshot_root)?;
        }
        info!(doc = %self.doc, "deleted live shard");
        Ok(true)
    }
}

fn latest_snapshot_time(snapshot_root: &Path) -> Result<Option<u64>> {
    if !snapshot_root.exists() {
        return Ok(None);
    }
    let mut latest = None;
    for entry in fs::read_dir(snapshot_root)? {
        let entry = entry?;
        if let Some(time) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        {
            latest = latest.max(Some(time));
        }
    }
    Ok(latest)
}
