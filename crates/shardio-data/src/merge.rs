//! Background merge pipeline
//!
//! Drains the sequential file store in strict id order and merges each
//! delta into the target shard's database. Exactly-once consumption comes
//! from the store: an entry is deleted only after its merge commits, so a
//! crash re-merges the undeleted entry on restart (idempotent, since a
//! delta's entries overwrite their own keys).

use crate::shard::Shard;
use shardio_common::error::{Error, Result};
use shardio_store::SequentialFileStore;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Consumes store entries and merges them into a shard
pub struct MergeProcessor {
    store: Arc<SequentialFileStore>,
    handle: Option<JoinHandle<()>>,
}

impl MergeProcessor {
    /// Start the drain thread.
    ///
    /// Resumes from the store's lowest surviving id, or waits for the next
    /// id to be added when the store is empty.
    pub fn start(store: Arc<SequentialFileStore>, shard: Arc<Shard>) -> Result<Self> {
        let min_id = store.get_min_store_id()?;
        let max_id = store.get_max_store_id()?;
        let mut next_id = if min_id == 0 { max_id + 1 } else { min_id };
        info!(doc = %shard.get_doc(), next_id, "starting merge processor");

        let drain_store = Arc::clone(&store);
        let handle = thread::Builder::new()
            .name("shard-merge".to_string())
            .spawn(move || {
                loop {
                    let file = match drain_store.await_next(next_id) {
                        Ok(file) => file,
                        Err(Error::StoreClosed) => {
                            debug!("merge processor stopping");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "merge processor failed to read store");
                            break;
                        }
                    };
                    match shard.merge(file.zip()) {
                        Ok(()) => {
                            if let Err(e) = drain_store.delete(&file) {
                                warn!(id = file.id(), error = %e, "failed to delete merged entry");
                            }
                            if let Some(latch) = file.latch() {
                                latch.count_down();
                            }
                            next_id += 1;
                        }
                        Err(e) => {
                            // Fail-stop: the entry stays in the store and is
                            // re-merged on restart. The submitter is released
                            // so a synchronous caller never hangs.
                            error!(id = file.id(), error = %e, "merge failed, stopping drain");
                            if let Some(latch) = file.latch() {
                                latch.count_down();
                            }
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            store,
            handle: Some(handle),
        })
    }

    /// Close the store and wait for the drain thread to finish
    pub fn stop(&mut self) {
        self.store.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MergeProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}
