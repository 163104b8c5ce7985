//! Inbound delta part intake
//!
//! Receives parts pushed by other nodes (or produced locally), persists
//! them to the staging directory and hands them to the sequential store,
//! where the merge pipeline picks them up in id order. All entry points
//! sit behind the processing-principal permission boundary.

use shardio_common::error::{Error, Result};
use shardio_common::types::{FileDescriptor, FileInfo, Principal};
use shardio_store::{CompletionLatch, SequentialFileStore};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Receives inbound delta parts and feeds the merge pipeline
pub struct PartDestination {
    staging_dir: PathBuf,
    store: Arc<SequentialFileStore>,
}

impl PartDestination {
    pub fn new(staging_dir: impl Into<PathBuf>, store: Arc<SequentialFileStore>) -> Result<Self> {
        let staging_dir = staging_dir.into();
        fs::create_dir_all(&staging_dir)?;
        Ok(Self { staging_dir, store })
    }

    /// Receive a part streamed from a remote node.
    ///
    /// The bytes are written to a uniquely named staging file, verified
    /// against `file_hash` and sequenced. With `synchronise_merge` the
    /// call blocks until the merge pipeline has consumed the part.
    /// Returns the allocated sequence id.
    #[allow(clippy::too_many_arguments)]
    pub fn receive_remote_part(
        &self,
        principal: &Principal,
        create_time_ms: u64,
        meta_id: u64,
        file_hash: &str,
        file_name: &str,
        synchronise_merge: bool,
        reader: &mut dyn Read,
    ) -> Result<u64> {
        if !principal.is_processing() {
            return Err(Error::PermissionDenied);
        }
        let staged = self.new_staging_path();
        let mut out = File::create(&staged)?;
        io::copy(reader, &mut out)?;
        out.flush()?;
        out.sync_all()?;
        drop(out);

        let descriptor = FileDescriptor::new(create_time_ms, meta_id, file_hash);
        let info = FileInfo::new(descriptor.clone(), staged.clone());
        debug!(%info, file_name, principal = %principal.name, "received remote part");
        self.hand_off(&descriptor, staged, synchronise_merge)
    }

    /// Receive a part that already exists on the local filesystem.
    ///
    /// When the caller guarantees the source is disposable it is handed
    /// straight to the store (the store's atomic rename consumes it);
    /// otherwise it is copied into staging first.
    pub fn receive_local_part(
        &self,
        principal: &Principal,
        descriptor: &FileDescriptor,
        source: &Path,
        source_is_disposable: bool,
        synchronise_merge: bool,
    ) -> Result<u64> {
        if !principal.is_processing() {
            return Err(Error::PermissionDenied);
        }
        let staged = if source_is_disposable {
            source.to_path_buf()
        } else {
            let staged = self.new_staging_path();
            fs::copy(source, &staged)?;
            staged
        };
        let info = FileInfo::new(descriptor.clone(), staged.clone());
        debug!(%info, principal = %principal.name, "received local part");
        self.hand_off(descriptor, staged, synchronise_merge)
    }

    fn new_staging_path(&self) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{}", Uuid::new_v4(), shardio_store::STORE_EXTENSION))
    }

    fn hand_off(
        &self,
        descriptor: &FileDescriptor,
        staged: PathBuf,
        synchronise_merge: bool,
    ) -> Result<u64> {
        let latch = synchronise_merge.then(|| Arc::new(CompletionLatch::new()));
        match self.store.add(descriptor, &staged, latch.clone()) {
            Ok(id) => {
                if let Some(latch) = latch {
                    latch.wait();
                }
                Ok(id)
            }
            Err(e) => {
                // The delta is discarded; the sender must resubmit
                let _ = fs::remove_file(&staged);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardio_common::checksum;
    use tempfile::tempdir;

    fn setup(root: &Path) -> (PartDestination, Arc<SequentialFileStore>) {
        let store = Arc::new(SequentialFileStore::open(root.join("store")).unwrap());
        let destination =
            PartDestination::new(root.join("staging"), Arc::clone(&store)).unwrap();
        (destination, store)
    }

    #[test]
    fn test_non_processing_principal_is_rejected() {
        let dir = tempdir().unwrap();
        let (destination, store) = setup(dir.path());

        let mut reader: &[u8] = b"delta";
        let err = destination
            .receive_remote_part(
                &Principal::user("alice"),
                1,
                2,
                &checksum::hash_bytes(b"delta"),
                "part.zip",
                false,
                &mut reader,
            )
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
        assert_eq!(store.get_max_store_id().unwrap(), 0);
    }

    #[test]
    fn test_remote_part_is_staged_and_sequenced() {
        let dir = tempdir().unwrap();
        let (destination, store) = setup(dir.path());

        let content = b"remote delta bytes";
        let mut reader: &[u8] = content;
        let id = destination
            .receive_remote_part(
                &Principal::processing("node-2"),
                123,
                42,
                &checksum::hash_bytes(content),
                "000042.zip",
                false,
                &mut reader,
            )
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.get_max_store_id().unwrap(), 1);

        let file = store.await_next(1).unwrap();
        assert_eq!(fs::read(file.zip()).unwrap(), content);
        // Staging holds nothing once the part is sequenced
        assert_eq!(fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
    }

    #[test]
    fn test_hash_mismatch_discards_staged_file() {
        let dir = tempdir().unwrap();
        let (destination, store) = setup(dir.path());

        let mut reader: &[u8] = b"actual bytes";
        let err = destination
            .receive_remote_part(
                &Principal::processing("node-2"),
                1,
                2,
                &checksum::hash_bytes(b"claimed bytes"),
                "part.zip",
                false,
                &mut reader,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert_eq!(store.get_max_store_id().unwrap(), 0);
        assert_eq!(fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
    }

    #[test]
    fn test_local_part_copy_leaves_source() {
        let dir = tempdir().unwrap();
        let (destination, store) = setup(dir.path());

        let source = dir.path().join("local.zip");
        fs::write(&source, b"local delta").unwrap();
        let descriptor = FileDescriptor::new(1, 2, checksum::hash_bytes(b"local delta"));

        let id = destination
            .receive_local_part(&Principal::processing("pipeline"), &descriptor, &source, false, false)
            .unwrap();
        assert_eq!(id, 1);
        assert!(source.exists());
        assert_eq!(store.get_max_store_id().unwrap(), 1);
    }

    #[test]
    fn test_local_disposable_part_is_moved() {
        let dir = tempdir().unwrap();
        let (destination, _store) = setup(dir.path());

        let source = dir.path().join("disposable.zip");
        fs::write(&source, b"local delta").unwrap();
        let descriptor = FileDescriptor::new(1, 2, checksum::hash_bytes(b"local delta"));

        destination
            .receive_local_part(&Principal::processing("pipeline"), &descriptor, &source, true, false)
            .unwrap();
        assert!(!source.exists());
    }
}
