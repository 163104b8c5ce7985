//! Snapshot-backed shard
//!
//! A read-only replica of a peer node's shard. The backing database image
//! is fetched remotely, served until its expiry passes, then replaced in
//! the background by a fresh fetch. Readers never block on staleness or
//! fetch failure: they run against the instance that was current when
//! they arrived, and that instance's files are only removed once the last
//! in-flight reader has released its guard.

use crate::db::{DbFactory, ShardDb};
use crate::guard::Guard;
use crate::paths::StatePaths;
use crate::transfer::FileTransferClient;
use parking_lot::{Mutex, RwLock};
use shardio_common::config::ShardConfig;
use shardio_common::error::{Error, Result};
use shardio_common::now_millis;
use shardio_common::types::{ShardDoc, SnapshotRequest};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

/// Hard cap on guard re-acquisition attempts per read
const MAX_READ_ATTEMPTS: usize = 100;

/// Lazily opened database handle for one snapshot instance.
///
/// The open/close lock is separate from the reference-counting guard used
/// for read access: only the thread that opens or closes the handle pays
/// for mutual exclusion, readers just clone the handle.
struct CurrentDb {
    doc: ShardDoc,
    db_dir: PathBuf,
    db_factory: DbFactory,
    slot: Mutex<Option<Arc<dyn ShardDb>>>,
    last_access_ms: AtomicU64,
}

impl CurrentDb {
    fn open(&self) -> Result<Arc<dyn ShardDb>> {
        self.last_access_ms.store(now_millis(), Ordering::SeqCst);
        let mut slot = self.slot.lock();
        if let Some(db) = slot.as_ref() {
            return Ok(Arc::clone(db));
        }
        debug!(doc = %self.doc, dir = %self.db_dir.display(), "opening snapshot database");
        let db = (self.db_factory)(&self.doc, &self.db_dir, true)?;
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }

    fn close(&self) {
        if self.slot.lock().take().is_some() {
            debug!(doc = %self.doc, "closed snapshot database");
        }
    }

    /// Close the handle if it has been idle for at least `idle_ms`,
    /// re-checked under the lock to avoid racing a concurrent opener.
    fn close_if_idle(&self, idle_ms: u64) -> bool {
        let mut slot = self.slot.lock();
        let idle = now_millis().saturating_sub(self.last_access_ms.load(Ordering::SeqCst));
        if slot.is_some() && idle >= idle_ms {
            *slot = None;
            true
        } else {
            false
        }
    }
}

/// One fetched-snapshot epoch.
///
/// Immutable apart from its expiry (pushed forward as a fetch-failure
/// backoff) and its lazily opened database handle. Destroyed, and its
/// files removed, only once every reader's guard has released.
pub struct SnapshotInstance {
    snapshot_time_ms: Option<u64>,
    fetch_error: Option<String>,
    expiry_ms: AtomicU64,
    current_db: Arc<CurrentDb>,
    guard: Guard,
}

impl SnapshotInstance {
    fn new(
        doc: ShardDoc,
        db_dir: PathBuf,
        snapshot_time_ms: Option<u64>,
        fetch_error: Option<String>,
        expiry_ms: u64,
        db_factory: DbFactory,
    ) -> Arc<Self> {
        let current_db = Arc::new(CurrentDb {
            doc,
            db_dir: db_dir.clone(),
            db_factory,
            slot: Mutex::new(None),
            last_access_ms: AtomicU64::new(now_millis()),
        });
        let teardown_db = Arc::clone(&current_db);
        let guard = Guard::new(move || {
            teardown_db.close();
            if teardown_db.db_dir.exists() {
                match fs::remove_dir_all(&teardown_db.db_dir) {
                    Ok(()) => {
                        debug!(dir = %teardown_db.db_dir.display(), "removed snapshot instance");
                    }
                    Err(e) => {
                        error!(dir = %teardown_db.db_dir.display(), error = %e,
                            "failed to remove snapshot instance");
                    }
                }
            }
        });
        Arc::new(Self {
            snapshot_time_ms,
            fetch_error,
            expiry_ms: AtomicU64::new(expiry_ms),
            current_db,
            guard,
        })
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expiry_ms.load(Ordering::SeqCst)
    }

    fn extend_expiry(&self, expiry_ms: u64) {
        self.expiry_ms.fetch_max(expiry_ms, Ordering::SeqCst);
    }

    fn with_db<R>(&self, action: &dyn Fn(&dyn ShardDb) -> Result<R>) -> Result<R> {
        self.guard.acquire(|| {
            if let Some(msg) = &self.fetch_error {
                return Err(Error::fetch_failed(msg.clone()));
            }
            let db = self.current_db.open()?;
            action(&*db)
        })
    }

    fn destroy(&self) {
        self.guard.destroy();
    }
}

struct Inner {
    config: Arc<ShardConfig>,
    paths: StatePaths,
    client: Arc<dyn FileTransferClient>,
    doc: ShardDoc,
    db_factory: DbFactory,
    instance: RwLock<Arc<SnapshotInstance>>,
    rotating: AtomicBool,
}

/// A shard served from remotely fetched snapshots
pub struct SnapshotShard {
    inner: Arc<Inner>,
}

impl SnapshotShard {
    /// Create the shard, performing the initial fetch inline.
    ///
    /// A failed initial fetch still yields a shard: the failure is
    /// recorded on the instance, reads fail with [`Error::FetchFailed`]
    /// and the next fetch happens no sooner than the retry interval.
    pub fn new(
        config: Arc<ShardConfig>,
        paths: StatePaths,
        client: Arc<dyn FileTransferClient>,
        doc: ShardDoc,
        db_factory: DbFactory,
    ) -> Result<Self> {
        fs::create_dir_all(paths.snapshot_root(&doc))?;
        let instance = match fetch_instance(&config, &paths, client.as_ref(), &doc, &db_factory, None)
        {
            Ok(instance) => instance,
            Err(e) => {
                warn!(doc = %doc, error = %e, "initial snapshot fetch failed");
                SnapshotInstance::new(
                    doc.clone(),
                    paths.new_snapshot_dir(&doc),
                    None,
                    Some(e.to_string()),
                    now_millis() + config.snapshot_retry_fetch_interval_ms,
                    Arc::clone(&db_factory),
                )
            }
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                paths,
                client,
                doc,
                db_factory,
                instance: RwLock::new(instance),
                rotating: AtomicBool::new(false),
            }),
        })
    }

    pub fn get_doc(&self) -> &ShardDoc {
        &self.inner.doc
    }

    /// Run a read action against the current snapshot.
    ///
    /// Staleness never blocks: an expired instance triggers a background
    /// rotation and the read proceeds against the instance that was
    /// current on arrival. Transient destroy/acquire races are retried up
    /// to a hard cap.
    pub fn get<R>(&self, action: impl Fn(&dyn ShardDb) -> Result<R>) -> Result<R> {
        self.read(&action)
    }

    fn read<R>(&self, action: &dyn Fn(&dyn ShardDb) -> Result<R>) -> Result<R> {
        for _ in 0..MAX_READ_ATTEMPTS {
            let instance = self.current_instance();
            match instance.with_db(action) {
                Err(Error::TryAgain) => continue,
                other => return other,
            }
        }
        Err(Error::RetryExhausted {
            attempts: MAX_READ_ATTEMPTS,
        })
    }

    /// Current instance, triggering a background rotation if it has
    /// expired. The caller's read always proceeds against the returned
    /// (possibly stale) instance.
    fn current_instance(&self) -> Arc<SnapshotInstance> {
        let instance = Arc::clone(&*self.inner.instance.read());
        if instance.is_expired(now_millis()) {
            Inner::try_rotate(&self.inner);
        }
        instance
    }

    /// Descriptive info string (JSON)
    pub fn get_info(&self) -> Result<String> {
        let instance = self.current_instance();
        let db_info = self.read(&|db: &dyn ShardDb| db.info())?;
        let info = serde_json::json!({
            "doc": self.inner.doc.name,
            "uuid": self.inner.doc.uuid,
            "kind": "snapshot",
            "snapshotTime": instance.snapshot_time_ms,
            "expiryTime": instance.expiry_ms.load(Ordering::SeqCst),
            "db": db_info,
        });
        Ok(info.to_string())
    }

    /// Close the snapshot's database handle if it has been idle beyond
    /// the configured threshold. The instance itself stays current, so
    /// the next read reopens quickly.
    pub fn cleanup(&self) -> Result<()> {
        let instance = Arc::clone(&*self.inner.instance.read());
        if instance
            .current_db
            .close_if_idle(self.inner.config.min_time_to_keep_db_open_ms)
        {
            debug!(doc = %self.inner.doc, "closed idle snapshot database");
        }
        Ok(())
    }

    /// Unconditionally destroy the current instance (the owning document
    /// was deleted). In-flight readers finish first; new reads fail.
    pub fn delete(&self) -> Result<bool> {
        let instance = Arc::clone(&*self.inner.instance.read());
        instance.destroy();
        info!(doc = %self.inner.doc, "deleted snapshot shard");
        Ok(true)
    }
}

impl Inner {
    fn try_rotate(inner: &Arc<Self>) {
        if inner
            .rotating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A rotation is already in flight
            return;
        }
        let worker = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name("snapshot-rotate".to_string())
            .spawn(move || {
                worker.rotate();
                worker.rotating.store(false, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            inner.rotating.store(false, Ordering::SeqCst);
            error!(doc = %inner.doc, error = %e, "failed to spawn snapshot rotation");
        }
    }

    fn rotate(&self) {
        let current = Arc::clone(&*self.instance.read());
        // Optimistic re-check: a failed fetch extends the expiry, so a
        // queued rotation may find there is nothing to do
        if !current.is_expired(now_millis()) {
            return;
        }
        match fetch_instance(
            &self.config,
            &self.paths,
            self.client.as_ref(),
            &self.doc,
            &self.db_factory,
            current.snapshot_time_ms,
        ) {
            Ok(fresh) => {
                let old = {
                    let mut slot = self.instance.write();
                    std::mem::replace(&mut *slot, fresh)
                };
                // Readers still on the old instance keep its files alive
                // until their guards release
                old.destroy();
                info!(doc = %self.doc, "rotated snapshot");
            }
            Err(e) => {
                // Push the next attempt out so repeated failures do not
                // cause a fetch storm
                current.extend_expiry(now_millis() + self.config.snapshot_retry_fetch_interval_ms);
                warn!(doc = %self.doc, error = %e, "snapshot rotation failed, serving stale data");
            }
        }
    }
}

/// Fetch a fresh snapshot into a new epoch directory, trying each
/// configured node in order. The first node that succeeds wins.
fn fetch_instance(
    config: &ShardConfig,
    paths: &StatePaths,
    client: &dyn FileTransferClient,
    doc: &ShardDoc,
    db_factory: &DbFactory,
    previous_snapshot_time_ms: Option<u64>,
) -> Result<Arc<SnapshotInstance>> {
    let destination = paths.new_snapshot_dir(doc);
    fs::create_dir_all(&destination)?;
    let request = SnapshotRequest::new(doc.uuid.clone(), 0, previous_snapshot_time_ms);
    let mut last_err = Error::fetch_failed("no snapshot nodes configured");
    for node in &config.node_list {
        match client.fetch_snapshot(node, &request, &destination) {
            Ok(snapshot_time_ms) => {
                info!(doc = %doc, node, snapshot_time_ms, "fetched snapshot");
                return Ok(SnapshotInstance::new(
                    doc.clone(),
                    destination,
                    Some(snapshot_time_ms),
                    None,
                    now_millis() + config.min_time_to_keep_snapshots_ms,
                    Arc::clone(db_factory),
                ));
            }
            Err(e) => {
                warn!(doc = %doc, node, error = %e, "snapshot fetch failed");
                last_err = e;
            }
        }
    }
    let _ = fs::remove_dir_all(&destination);
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::Shard;
    use shardio_store::CompletionLatch;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    /// Stub database; snapshot lifecycle tests don't need a real engine
    struct TestDb;

    impl ShardDb for TestDb {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
            Ok(Some(b"value".to_vec()))
        }
        fn put(&self, _key: &[u8], _effective_time_ms: u64, _value: &[u8]) -> Result<()> {
            Ok(())
        }
        fn merge(&self, _source: &Path) -> Result<()> {
            Ok(())
        }
        fn delete_old_data(&self, _delete_before_ms: u64, _use_state_time: bool) -> Result<u64> {
            Ok(0)
        }
        fn condense(&self, _condense_before_ms: u64) -> Result<u64> {
            Ok(0)
        }
        fn compact(&self) -> Result<bool> {
            Ok(false)
        }
        fn write_snapshot(&self, _destination: &Path) -> Result<()> {
            Ok(())
        }
        fn count(&self) -> Result<u64> {
            Ok(0)
        }
        fn info(&self) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    type FetchFn = dyn Fn(usize, &SnapshotRequest, &Path) -> Result<u64> + Send + Sync;

    struct TestClient {
        count: AtomicUsize,
        destinations: Mutex<Vec<PathBuf>>,
        fetch: Box<FetchFn>,
    }

    impl TestClient {
        fn new(
            fetch: impl Fn(usize, &SnapshotRequest, &Path) -> Result<u64> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
                destinations: Mutex::new(Vec::new()),
                fetch: Box::new(fetch),
            })
        }

        fn ok() -> Arc<Self> {
            Self::new(|_, _, destination| {
                fs::write(destination.join("data"), b"snapshot image")?;
                Ok(now_millis())
            })
        }

        fn fetches(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }

        fn destination(&self, index: usize) -> PathBuf {
            self.destinations.lock()[index].clone()
        }
    }

    impl FileTransferClient for TestClient {
        fn fetch_snapshot(
            &self,
            _node: &str,
            request: &SnapshotRequest,
            destination: &Path,
        ) -> Result<u64> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            self.destinations.lock().push(destination.to_path_buf());
            (self.fetch)(n, request, destination)
        }
    }

    fn test_config(keep_ms: u64, retry_ms: u64) -> Arc<ShardConfig> {
        Arc::new(ShardConfig {
            node_list: vec!["test-node".to_string()],
            min_time_to_keep_snapshots_ms: keep_ms,
            min_time_to_keep_db_open_ms: 1000,
            snapshot_retry_fetch_interval_ms: retry_ms,
        })
    }

    fn test_factory() -> DbFactory {
        Arc::new(|_, _, _| Ok(Arc::new(TestDb) as Arc<dyn ShardDb>))
    }

    fn counting_factory(opens: Arc<AtomicUsize>) -> DbFactory {
        Arc::new(move |_, _, _| {
            opens.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(TestDb) as Arc<dyn ShardDb>)
        })
    }

    fn new_shard(
        root: &Path,
        config: Arc<ShardConfig>,
        client: Arc<TestClient>,
        factory: DbFactory,
    ) -> SnapshotShard {
        SnapshotShard::new(
            config,
            StatePaths::new(root),
            client,
            ShardDoc::new("test-uuid", "test-shard"),
            factory,
        )
        .unwrap()
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_concurrent_reads_all_succeed() {
        let dir = tempdir().unwrap();
        let client = TestClient::ok();
        let shard = Arc::new(new_shard(
            dir.path(),
            test_config(60_000, 2_000),
            Arc::clone(&client),
            test_factory(),
        ));

        let threads = 8;
        let reads_per_thread = 50;
        let successes = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..threads {
            let shard = Arc::clone(&shard);
            let successes = Arc::clone(&successes);
            handles.push(thread::spawn(move || {
                for _ in 0..reads_per_thread {
                    shard.get_info().unwrap();
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(successes.load(Ordering::SeqCst), threads * reads_per_thread);
        assert_eq!(client.fetches(), 1);
    }

    #[test]
    fn test_rotation_after_expiry() {
        let dir = tempdir().unwrap();
        let client = TestClient::ok();
        let shard = new_shard(
            dir.path(),
            test_config(100, 2_000),
            Arc::clone(&client),
            test_factory(),
        );

        // Initial fetch happened in the constructor
        assert_eq!(client.fetches(), 1);

        thread::sleep(Duration::from_millis(150));
        shard.get_info().unwrap();

        assert!(wait_until(Duration::from_secs(2), || client.fetches() >= 2));
        // The superseded instance had no readers left, so its files are
        // gone once rotation completes
        assert!(wait_until(Duration::from_secs(2), || {
            !client.destination(0).exists()
        }));
    }

    #[test]
    fn test_only_one_rotation_at_a_time() {
        let dir = tempdir().unwrap();
        let fetch_started = Arc::new(CompletionLatch::new());
        let proceed = Arc::new(CompletionLatch::new());
        let client = {
            let fetch_started = Arc::clone(&fetch_started);
            let proceed = Arc::clone(&proceed);
            TestClient::new(move |n, _, destination| {
                fs::write(destination.join("data"), b"snapshot image")?;
                if n == 2 {
                    fetch_started.count_down();
                    proceed.wait();
                }
                Ok(now_millis())
            })
        };
        let shard = Arc::new(new_shard(
            dir.path(),
            test_config(100, 2_000),
            Arc::clone(&client),
            test_factory(),
        ));

        thread::sleep(Duration::from_millis(150));

        // Hammer the expired shard; only one rotation may start
        let mut handles = Vec::new();
        for _ in 0..10 {
            let shard = Arc::clone(&shard);
            handles.push(thread::spawn(move || {
                shard.get_info().unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(fetch_started.wait_timeout(Duration::from_secs(2)));
        // Initial fetch + exactly one in-flight rotation
        assert_eq!(client.fetches(), 2);
        proceed.count_down();
    }

    #[test]
    fn test_failed_fetch_extends_expiry() {
        let dir = tempdir().unwrap();
        let client = TestClient::new(|n, _, destination| {
            if n == 1 {
                fs::write(destination.join("data"), b"snapshot image")?;
                Ok(now_millis())
            } else {
                Err(Error::fetch_failed("node unreachable"))
            }
        });
        let shard = new_shard(
            dir.path(),
            test_config(100, 5_000),
            Arc::clone(&client),
            test_factory(),
        );

        thread::sleep(Duration::from_millis(150));
        shard.get_info().unwrap();
        assert!(wait_until(Duration::from_secs(2), || client.fetches() == 2));

        // The failure pushed the expiry out by the retry interval, so an
        // immediate follow-up read must not refetch
        thread::sleep(Duration::from_millis(200));
        shard.get_info().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(client.fetches(), 2);
    }

    #[test]
    fn test_reader_overlapping_rotation_keeps_old_instance_alive() {
        let dir = tempdir().unwrap();
        let client = TestClient::ok();
        let shard = Arc::new(new_shard(
            dir.path(),
            test_config(100, 2_000),
            Arc::clone(&client),
            test_factory(),
        ));

        let reading = Arc::new(CompletionLatch::new());
        let release = Arc::new(CompletionLatch::new());
        let reader = {
            let shard = Arc::clone(&shard);
            let reading = Arc::clone(&reading);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                shard
                    .get(|_db| {
                        reading.count_down();
                        release.wait();
                        Ok(())
                    })
                    .unwrap();
            })
        };
        reading.wait();

        // Expire and rotate while the reader holds instance 0
        thread::sleep(Duration::from_millis(150));
        shard.get_info().unwrap();
        assert!(wait_until(Duration::from_secs(2), || client.fetches() >= 2));

        // The old instance's files survive while the reader is in flight
        let old_dir = client.destination(0);
        assert!(old_dir.exists());

        release.count_down();
        reader.join().unwrap();
        assert!(wait_until(Duration::from_secs(2), || !old_dir.exists()));
    }

    #[test]
    fn test_cleanup_closes_idle_db() {
        let dir = tempdir().unwrap();
        let opens = Arc::new(AtomicUsize::new(0));
        let client = TestClient::ok();
        let config = Arc::new(ShardConfig {
            node_list: vec!["test-node".to_string()],
            min_time_to_keep_snapshots_ms: 60_000,
            min_time_to_keep_db_open_ms: 100,
            snapshot_retry_fetch_interval_ms: 2_000,
        });
        let shard = new_shard(dir.path(), config, client, counting_factory(Arc::clone(&opens)));

        shard.get(|_db| Ok(())).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // Recently accessed: clean-up leaves the handle open
        shard.cleanup().unwrap();
        shard.get(|_db| Ok(())).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // Idle past the threshold: clean-up closes, the next read reopens
        thread::sleep(Duration::from_millis(150));
        shard.cleanup().unwrap();
        shard.get(|_db| Ok(())).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delete_destroys_instance() {
        let dir = tempdir().unwrap();
        let client = TestClient::ok();
        let shard = new_shard(
            dir.path(),
            test_config(60_000, 2_000),
            Arc::clone(&client),
            test_factory(),
        );

        assert!(shard.delete().unwrap());
        assert!(wait_until(Duration::from_secs(2), || {
            !client.destination(0).exists()
        }));

        // The bounded retry loop terminates instead of spinning forever
        let err = shard.get(|_db| Ok(())).unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { .. }));
    }

    #[test]
    fn test_initial_fetch_failure_is_recorded() {
        let dir = tempdir().unwrap();
        let client = TestClient::new(|_, _, _| Err(Error::fetch_failed("node unreachable")));
        let shard = new_shard(
            dir.path(),
            test_config(100, 60_000),
            Arc::clone(&client),
            test_factory(),
        );
        assert_eq!(client.fetches(), 1);

        // Reads fail with the recorded fetch error, and the retry
        // interval keeps them from triggering an immediate refetch
        let err = shard.get(|_db| Ok(())).unwrap_err();
        assert!(matches!(err, Error::FetchFailed(_)));
        shard.get(|_db| Ok(())).unwrap_err();
        assert_eq!(client.fetches(), 1);
    }

    #[test]
    fn test_unsupported_operations() {
        let dir = tempdir().unwrap();
        let client = TestClient::ok();
        let shard = Shard::Snapshot(new_shard(
            dir.path(),
            test_config(60_000, 2_000),
            client,
            test_factory(),
        ));

        let err = shard.merge(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(err.to_string().contains("not supported"));

        assert_eq!(shard.delete_old_data(0, true).unwrap(), 0);
        assert_eq!(shard.condense(0).unwrap(), 0);
        shard.compact().unwrap();
        shard
            .check_snapshot_status(&SnapshotRequest::new("test-uuid", 0, None))
            .unwrap();
        shard.create_snapshot().unwrap();
    }

    #[test]
    fn test_get_doc() {
        let dir = tempdir().unwrap();
        let shard = new_shard(
            dir.path(),
            test_config(60_000, 2_000),
            TestClient::ok(),
            test_factory(),
        );
        assert_eq!(shard.get_doc().uuid, "test-uuid");
        assert_eq!(shard.get_doc().name, "test-shard");
    }

    #[test]
    fn test_reads_survive_continuous_rotation() {
        let dir = tempdir().unwrap();
        let client = TestClient::new(|_, _, destination| {
            fs::write(destination.join("data"), b"snapshot image")?;
            // Slow fetch so reads overlap in-flight rotations
            thread::sleep(Duration::from_millis(50));
            Ok(now_millis())
        });
        let shard = Arc::new(new_shard(
            dir.path(),
            test_config(50, 2_000),
            client,
            test_factory(),
        ));

        for _ in 0..30 {
            shard.get_info().unwrap();
            thread::sleep(Duration::from_millis(10));
        }
    }
}
