//! Ordered key-value abstraction backing a shard
//!
//! `ShardDb` is the seam between the shard lifecycle layer and the
//! embedded engine. Entries are temporally versioned: each put carries an
//! effective time, `get` answers with the latest version, and the
//! maintenance operations (retention, condensing, compaction) work on the
//! per-key version runs. The production implementation is backed by redb;
//! tests inject stubs through [`DbFactory`].

use shardio_common::error::{Error, Result};
use shardio_common::types::ShardDoc;
use shardio_common::now_millis;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File name of the database inside a shard or snapshot directory
pub const DB_FILE_NAME: &str = "shard.redb";

/// Stored key: user key bytes plus the entry's effective time. The tuple
/// ordering keeps a key's versions contiguous and time-ordered.
const STATE_TABLE: TableDefinition<(&[u8], u64), &[u8]> = TableDefinition::new("state");

/// Ordered KV interface a shard operates against
pub trait ShardDb: Send + Sync {
    /// Latest value for `key`, if any
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert a value effective from `effective_time_ms`
    fn put(&self, key: &[u8], effective_time_ms: u64, value: &[u8]) -> Result<()>;

    /// Merge every entry of a delta database into this one.
    ///
    /// `source` is either a database file or a directory containing one.
    fn merge(&self, source: &Path) -> Result<()>;

    /// Remove entries older than `delete_before_ms`, always retaining the
    /// newest entry per key so current state survives retention.
    /// `use_state_time` selects the effective time for the comparison;
    /// otherwise the insert time is used. Returns the number removed.
    fn delete_old_data(&self, delete_before_ms: u64, use_state_time: bool) -> Result<u64>;

    /// Collapse runs of equal-valued versions older than
    /// `condense_before_ms`, keeping the earliest of each run. Returns the
    /// number removed.
    fn condense(&self, condense_before_ms: u64) -> Result<u64>;

    /// Reclaim free space in place. Returns true if anything was done.
    fn compact(&self) -> Result<bool>;

    /// Write a compacted copy of the database into `destination`
    fn write_snapshot(&self, destination: &Path) -> Result<()>;

    /// Number of stored entries (all versions)
    fn count(&self) -> Result<u64>;

    /// Descriptive info for logging and dashboards
    fn info(&self) -> Result<serde_json::Value>;
}

/// Factory seam for opening a shard's database in a directory
pub type DbFactory =
    Arc<dyn Fn(&ShardDoc, &Path, bool) -> Result<Arc<dyn ShardDb>> + Send + Sync>;

/// The production factory, backed by redb
#[must_use]
pub fn redb_factory() -> DbFactory {
    Arc::new(|doc, dir, read_only| {
        let db = RedbDb::open(doc, dir, read_only)?;
        Ok(Arc::new(db) as Arc<dyn ShardDb>)
    })
}

fn store_err(e: impl Display) -> Error {
    Error::storage(e.to_string())
}

fn encode_value(insert_time_ms: u64, payload: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(8 + payload.len());
    value.extend_from_slice(&insert_time_ms.to_le_bytes());
    value.extend_from_slice(payload);
    value
}

fn decode_value(stored: &[u8]) -> (u64, &[u8]) {
    let mut time_buf = [0u8; 8];
    time_buf.copy_from_slice(&stored[..8]);
    (u64::from_le_bytes(time_buf), &stored[8..])
}

/// redb-backed shard database
pub struct RedbDb {
    doc: ShardDoc,
    path: PathBuf,
    read_only: bool,
    // compact() needs exclusive access; everything else reads through
    db: RwLock<Database>,
}

impl RedbDb {
    /// Open (or create) the database inside `dir`
    pub fn open(doc: &ShardDoc, dir: &Path, read_only: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE_NAME);
        let db = Database::create(&path).map_err(store_err)?;
        if !read_only {
            // Create the table eagerly so later read txns don't fail
            let txn = db.begin_write().map_err(store_err)?;
            txn.open_table(STATE_TABLE).map_err(store_err)?;
            txn.commit().map_err(store_err)?;
        }
        debug!(doc = %doc, path = %path.display(), read_only, "opened shard database");
        Ok(Self {
            doc: doc.clone(),
            path,
            read_only,
            db: RwLock::new(db),
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::unsupported("database is read-only"))
        } else {
            Ok(())
        }
    }

    /// Collect `(user key, effective time, insert time, payload)` for
    /// every entry, in key-then-time order. Empty if the table does not
    /// exist yet.
    #[allow(clippy::type_complexity)]
    fn all_entries(&self) -> Result<Vec<(Vec<u8>, u64, u64, Vec<u8>)>> {
        let db = self.db.read();
        let txn = db.begin_read().map_err(store_err)?;
        let table = match txn.open_table(STATE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(store_err(e)),
        };
        let mut entries = Vec::new();
        for item in table.iter().map_err(store_err)? {
            let (key_guard, value_guard) = item.map_err(store_err)?;
            let (key, time) = key_guard.value();
            let (insert_time, payload) = decode_value(value_guard.value());
            entries.push((key.to_vec(), time, insert_time, payload.to_vec()));
        }
        Ok(entries)
    }

    fn remove_entries(&self, to_remove: &[(Vec<u8>, u64)]) -> Result<()> {
        if to_remove.is_empty() {
            return Ok(());
        }
        let db = self.db.read();
        let txn = db.begin_write().map_err(store_err)?;
        {
            let mut table = txn.open_table(STATE_TABLE).map_err(store_err)?;
            for (key, time) in to_remove {
                table.remove((key.as_slice(), *time)).map_err(store_err)?;
            }
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }
}

impl ShardDb for RedbDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let db = self.db.read();
        let txn = db.begin_read().map_err(store_err)?;
        let table = match txn.open_table(STATE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(store_err(e)),
        };
        let mut range = table
            .range((key, 0u64)..=(key, u64::MAX))
            .map_err(store_err)?;
        match range.next_back() {
            Some(item) => {
                let (_, value_guard) = item.map_err(store_err)?;
                let (_, payload) = decode_value(value_guard.value());
                Ok(Some(payload.to_vec()))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], effective_time_ms: u64, value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let stored = encode_value(now_millis(), value);
        let db = self.db.read();
        let txn = db.begin_write().map_err(store_err)?;
        {
            let mut table = txn.open_table(STATE_TABLE).map_err(store_err)?;
            table
                .insert((key, effective_time_ms), stored.as_slice())
                .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn merge(&self, source: &Path) -> Result<()> {
        self.ensure_writable()?;
        let source_file = if source.is_dir() {
            source.join(DB_FILE_NAME)
        } else {
            source.to_path_buf()
        };
        let delta = Database::open(&source_file).map_err(store_err)?;
        let delta_txn = delta.begin_read().map_err(store_err)?;
        let delta_table = match delta_txn.open_table(STATE_TABLE) {
            Ok(table) => table,
            // An empty delta has nothing to merge
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(store_err(e)),
        };

        let db = self.db.read();
        let txn = db.begin_write().map_err(store_err)?;
        let mut merged = 0u64;
        {
            let mut table = txn.open_table(STATE_TABLE).map_err(store_err)?;
            for item in delta_table.iter().map_err(store_err)? {
                let (key_guard, value_guard) = item.map_err(store_err)?;
                table
                    .insert(key_guard.value(), value_guard.value())
                    .map_err(store_err)?;
                merged += 1;
            }
        }
        txn.commit().map_err(store_err)?;
        info!(doc = %self.doc, source = %source_file.display(), merged, "merged delta");
        Ok(())
    }

    fn delete_old_data(&self, delete_before_ms: u64, use_state_time: bool) -> Result<u64> {
        self.ensure_writable()?;
        let entries = self.all_entries()?;
        let mut to_remove = Vec::new();
        let mut i = 0;
        while i < entries.len() {
            // One key's version run
            let key = &entries[i].0;
            let mut end = i;
            while end < entries.len() && entries[end].0 == *key {
                end += 1;
            }
            // The newest version per key always survives retention
            for (entry_key, state_time, insert_time, _) in &entries[i..end - 1] {
                let time = if use_state_time {
                    *state_time
                } else {
                    *insert_time
                };
                if time < delete_before_ms {
                    to_remove.push((entry_key.clone(), *state_time));
                }
            }
            i = end;
        }
        self.remove_entries(&to_remove)?;
        debug!(doc = %self.doc, removed = to_remove.len(), "deleted old data");
        Ok(to_remove.len() as u64)
    }

    fn condense(&self, condense_before_ms: u64) -> Result<u64> {
        self.ensure_writable()?;
        let entries = self.all_entries()?;
        let mut to_remove = Vec::new();
        let mut prev: Option<(&[u8], &[u8])> = None;
        for (key, state_time, _, payload) in &entries {
            let same_run = prev
                .is_some_and(|(prev_key, prev_payload)| prev_key == key && prev_payload == payload);
            if same_run && *state_time < condense_before_ms {
                // Value unchanged since the previous surviving version;
                // the earlier one carries the state
                to_remove.push((key.clone(), *state_time));
            } else {
                prev = Some((key, payload));
            }
        }
        self.remove_entries(&to_remove)?;
        debug!(doc = %self.doc, removed = to_remove.len(), "condensed");
        Ok(to_remove.len() as u64)
    }

    fn compact(&self) -> Result<bool> {
        self.ensure_writable()?;
        let mut db = self.db.write();
        let compacted = db.compact().map_err(store_err)?;
        info!(doc = %self.doc, compacted, "compacted shard database");
        Ok(compacted)
    }

    fn write_snapshot(&self, destination: &Path) -> Result<()> {
        fs::create_dir_all(destination)?;
        let target = Database::create(destination.join(DB_FILE_NAME)).map_err(store_err)?;
        let entries = self.all_entries()?;
        let txn = target.begin_write().map_err(store_err)?;
        {
            let mut table = txn.open_table(STATE_TABLE).map_err(store_err)?;
            for (key, time, insert_time, payload) in &entries {
                table
                    .insert(
                        (key.as_slice(), *time),
                        encode_value(*insert_time, payload).as_slice(),
                    )
                    .map_err(store_err)?;
            }
        }
        txn.commit().map_err(store_err)?;
        info!(doc = %self.doc, destination = %destination.display(), entries = entries.len(),
            "wrote snapshot");
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let db = self.db.read();
        let txn = db.begin_read().map_err(store_err)?;
        match txn.open_table(STATE_TABLE) {
            Ok(table) => table.len().map_err(store_err),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(store_err(e)),
        }
    }

    fn info(&self) -> Result<serde_json::Value> {
        let entries = self.count()?;
        let file_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(serde_json::json!({
            "path": self.path.display().to_string(),
            "entries": entries,
            "fileSizeBytes": file_size,
            "readOnly": self.read_only,
        }))
    }
}
