//! Durable ordered delta queue
//!
//! An append-only store of opaque delta files, each identified by a
//! strictly increasing, gap-free sequence id and laid out on disk with the
//! sharded scheme from [`crate::dir_util`]. Staged files are verified
//! against their content hash and moved into place with an atomic rename,
//! so a crash never leaves a half-written entry at a published id.
//!
//! The consumer side discovers entries in strict id order via
//! [`SequentialFileStore::await_next`], which blocks on a condition
//! variable rather than polling.

use crate::dir_util;
use crate::latch::CompletionLatch;
use parking_lot::{Condvar, Mutex};
use shardio_common::checksum;
use shardio_common::error::{Error, Result};
use shardio_common::types::FileDescriptor;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File extension for stored delta files
pub const STORE_EXTENSION: &str = "zip";

/// One allocated slot in the store: the stored zip plus the ordered chain
/// of directories that lead to it (and that may need pruning after
/// deletion).
#[derive(Debug)]
pub struct SequentialFile {
    id: u64,
    sub_dirs: Vec<PathBuf>,
    zip: PathBuf,
    latch: Option<Arc<CompletionLatch>>,
}

impl SequentialFile {
    fn new(root: &Path, id: u64) -> Self {
        let id_string = dir_util::id_to_string(id);
        let depth = id_string.len() / 3 - 1;
        let mut dir = root.join(depth.to_string());
        let mut sub_dirs = vec![dir.clone()];
        let len = id_string.len();
        let mut i = 0;
        while i + 3 < len {
            dir.push(&id_string[i..i + 3]);
            sub_dirs.push(dir.clone());
            i += 3;
        }
        let zip = dir.join(format!("{id_string}.{STORE_EXTENSION}"));
        Self {
            id,
            sub_dirs,
            zip,
            latch: None,
        }
    }

    /// Sequence id of this entry
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path of the stored delta file
    #[must_use]
    pub fn zip(&self) -> &Path {
        &self.zip
    }

    /// The submitter's completion latch, if the add was synchronous
    #[must_use]
    pub fn latch(&self) -> Option<&Arc<CompletionLatch>> {
        self.latch.as_ref()
    }
}

#[derive(Debug)]
struct StoreState {
    /// Highest id fully added and published, 0 = none
    added_id: u64,
    /// Next id to allocate
    next_id: u64,
    /// Latches waiting on merge completion, keyed by sequence id
    latches: HashMap<u64, Arc<CompletionLatch>>,
    closed: bool,
}

/// Append-only store of sequenced delta files
#[derive(Debug)]
pub struct SequentialFileStore {
    root: PathBuf,
    state: Mutex<StoreState>,
    added: Condvar,
}

impl SequentialFileStore {
    /// Open the store rooted at `root`, recovering its id bounds from the
    /// directory tree.
    ///
    /// Recovery tolerates partially written trees: a missing file simply
    /// means "no id here yet", since concurrent adds can leave transient
    /// partial state. This is deliberately weaker than the fatal
    /// inconsistency check in [`crate::dir_util::max_dir_id`], which
    /// covers durable, already-committed id allocation.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let max_id = scan_store_id(&root, ScanMode::Max)?;
        info!(root = %root.display(), max_id, "opened sequential file store");
        Ok(Self {
            root,
            state: Mutex::new(StoreState {
                added_id: max_id,
                next_id: max_id + 1,
                latches: HashMap::new(),
                closed: false,
            }),
            added: Condvar::new(),
        })
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a staged delta file to the store.
    ///
    /// The staged file's content hash is verified against the descriptor
    /// first; a mismatch fails the add with the store unchanged and the
    /// staged file left for the caller to discard. On success the file has
    /// been atomically renamed to its allocated slot, the new id is
    /// published to waiters, and the id is returned. If a latch is
    /// supplied it is retrievable by the consumer of this id, so the
    /// submitter can block until the delta has been merged.
    pub fn add(
        &self,
        descriptor: &FileDescriptor,
        staged: &Path,
        latch: Option<Arc<CompletionLatch>>,
    ) -> Result<u64> {
        // Hash the file outside the allocation lock
        checksum::verify_file(staged, &descriptor.file_hash)?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::StoreClosed);
        }
        let id = state.next_id;
        let file = SequentialFile::new(&self.root, id);
        if let Some(parent) = file.zip.parent() {
            dir_util::ensure_dir_exists(parent)?;
        }
        fs::rename(staged, &file.zip)?;
        state.next_id += 1;
        state.added_id = id;
        if let Some(latch) = latch {
            state.latches.insert(id, latch);
        }
        debug!(id, meta_id = descriptor.meta_id, zip = %file.zip.display(), "stored delta");
        self.added.notify_all();
        Ok(id)
    }

    /// Block until an entry with id >= `store_id` has been added, then
    /// return the entry for exactly `store_id` with its latch (if any)
    /// attached.
    ///
    /// Returns [`Error::StoreClosed`] if the store is closed while
    /// waiting.
    pub fn await_next(&self, store_id: u64) -> Result<SequentialFile> {
        let mut state = self.state.lock();
        while state.added_id < store_id {
            if state.closed {
                return Err(Error::StoreClosed);
            }
            self.added.wait(&mut state);
        }
        if state.closed {
            return Err(Error::StoreClosed);
        }
        let latch = state.latches.remove(&store_id);
        let mut file = SequentialFile::new(&self.root, store_id);
        file.latch = latch;
        Ok(file)
    }

    /// Recover the highest stored id by directory descent, or 0 if the
    /// store is empty
    pub fn get_max_store_id(&self) -> Result<u64> {
        scan_store_id(&self.root, ScanMode::Max)
    }

    /// Recover the lowest stored id by directory descent, or 0 if the
    /// store is empty
    pub fn get_min_store_id(&self) -> Result<u64> {
        scan_store_id(&self.root, ScanMode::Min)
    }

    /// Delete a consumed entry and prune its now-empty ancestor
    /// directories bottom-up.
    ///
    /// A directory-not-empty error during pruning is expected (other
    /// entries still live in that part of the tree) and stops the prune.
    pub fn delete(&self, file: &SequentialFile) -> Result<()> {
        fs::remove_file(&file.zip)?;
        for dir in file.sub_dirs.iter().rev() {
            match fs::remove_dir(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(id = file.id, "deleted store entry");
        Ok(())
    }

    /// Close the store, waking all waiters with [`Error::StoreClosed`].
    /// Already-stored files are untouched.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.added.notify_all();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanMode {
    Min,
    Max,
}

/// Recover the min/max stored id by descending the tree one level at a
/// time, at each level picking the single numeric child that is min/max.
/// Dead ends are treated as "no id here yet".
fn scan_store_id(root: &Path, mode: ScanMode) -> Result<u64> {
    let depth_dirs = ordered_children(root, mode, |name, is_dir| {
        is_dir && dir_util::is_valid_depth_part(name)
    })?;
    for (path, _) in depth_dirs {
        if let Some(id) = scan_level(&path, mode)? {
            return Ok(id);
        }
    }
    Ok(0)
}

fn scan_level(dir: &Path, mode: ScanMode) -> Result<Option<u64>> {
    let children = ordered_children(dir, mode, |name, is_dir| {
        if is_dir {
            dir_util::is_valid_branch_part(name)
        } else {
            zip_stem(name).is_some_and(dir_util::is_valid_leaf_part)
        }
    })?;
    for (path, num) in children {
        if path.is_dir() {
            if let Some(id) = scan_level(&path, mode)? {
                return Ok(Some(id));
            }
        } else {
            return Ok(Some(num));
        }
    }
    Ok(None)
}

fn zip_stem(name: &str) -> Option<&str> {
    name.strip_suffix(&format!(".{STORE_EXTENSION}"))
}

/// List direct children of `dir` accepted by `accept(name, is_dir)` with
/// their numeric values, sorted ascending for Min and descending for Max.
fn ordered_children(
    dir: &Path,
    mode: ScanMode,
    accept: impl Fn(&str, bool) -> bool,
) -> Result<Vec<(PathBuf, u64)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_dir = entry.file_type()?.is_dir();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !accept(name, is_dir) {
            warn!(path = %path.display(), "ignoring unexpected entry in store tree");
            continue;
        }
        let numeric = if is_dir {
            name.parse::<u64>().ok()
        } else {
            zip_stem(name).and_then(|stem| stem.parse::<u64>().ok())
        };
        match numeric {
            Some(num) => out.push((path, num)),
            None => {
                warn!(path = %path.display(), "ignoring non-numeric entry in store tree");
            }
        }
    }
    match mode {
        ScanMode::Min => out.sort_by_key(|(_, num)| *num),
        ScanMode::Max => out.sort_by_key(|(_, num)| std::cmp::Reverse(*num)),
    }
    Ok(out)
}
