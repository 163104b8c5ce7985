//! On-disk layout for one node's shard data
//!
//! ```text
//! <root>/
//!   shards/<doc-uuid>/              live shard databases
//!   snapshots/<doc-uuid>/<epoch>/   fetched snapshot instances
//!   staging/                        inbound parts before sequencing
//!   store/                          sequential file store root
//! ```

use shardio_common::error::Result;
use shardio_common::types::ShardDoc;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Resolves the fixed directories under a state root
#[derive(Clone, Debug)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a live shard's database
    #[must_use]
    pub fn shard_dir(&self, doc: &ShardDoc) -> PathBuf {
        self.root.join("shards").join(&doc.uuid)
    }

    /// Parent directory of a document's snapshot epochs
    #[must_use]
    pub fn snapshot_root(&self, doc: &ShardDoc) -> PathBuf {
        self.root.join("snapshots").join(&doc.uuid)
    }

    /// A fresh, uniquely named directory for one snapshot epoch
    #[must_use]
    pub fn new_snapshot_dir(&self, doc: &ShardDoc) -> PathBuf {
        self.snapshot_root(doc).join(Uuid::new_v4().to_string())
    }

    /// Staging directory for inbound parts
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    /// Root of the sequential file store
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Create the fixed directories
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(self.root.join("shards"))?;
        fs::create_dir_all(self.root.join("snapshots"))?;
        fs::create_dir_all(self.staging_dir())?;
        fs::create_dir_all(self.store_dir())?;
        Ok(())
    }
}
