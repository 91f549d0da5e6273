//! Test fixtures for stores and engines.
//!
//! Provides stores that clean up after themselves and an engine harness
//! with every seam replaced by a scriptable stand-in.

use hsesync_engine::{
    open_store, open_store_in_memory, ConnectivityMonitor, MockRemote, OfflineWriter,
    RecordingNotifier, SyncConfig, SyncEngine,
};
use hsesync_store::LocalStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    store: Option<Arc<LocalStore>>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store with the standard partitions.
    pub fn memory() -> Self {
        Self {
            store: Some(Arc::new(
                open_store_in_memory().expect("Failed to open in-memory store"),
            )),
            temp_dir: None,
        }
    }

    /// Creates an on-disk store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = open_store(&temp_dir.path().join("store")).expect("Failed to open file store");
        Self {
            store: Some(Arc::new(store)),
            temp_dir: Some(temp_dir),
        }
    }

    /// The store.
    pub fn store(&self) -> &Arc<LocalStore> {
        self.store.as_ref().expect("store is open")
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("store"))
    }

    /// Closes and reopens a file-based store, as after a restart.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores, or if another handle to the store is
    /// still alive.
    pub fn reopen(&mut self) {
        let path = self.path().expect("only file stores can be reopened");
        let store = self.store.take().expect("store is open");
        let store = Arc::try_unwrap(store).expect("store still shared");
        store.close().expect("Failed to close store");
        drop(store);
        self.store = Some(Arc::new(open_store(&path).expect("Failed to reopen store")));
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        self.store()
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// Runs a test with a temporary on-disk store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore, &Path) -> R,
{
    let store = TestStore::file();
    let path = store.path().expect("File store should have a path");
    f(&store, &path)
}

/// An engine wired to stand-ins for the remote, connectivity and the UI.
pub struct EngineHarness {
    /// The engine under test.
    pub engine: Arc<SyncEngine>,
    /// The write path sharing the engine's store.
    pub writer: OfflineWriter,
    /// The scripted remote.
    pub remote: Arc<MockRemote>,
    /// Connectivity, driven by the test.
    pub connectivity: Arc<ConnectivityMonitor>,
    /// Every notice the engine sent.
    pub notices: Arc<RecordingNotifier>,
}

impl EngineHarness {
    /// Builds a harness over `store`.
    pub fn new(store: Arc<LocalStore>, config: SyncConfig, online: bool) -> Self {
        let remote = Arc::new(MockRemote::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(online));
        let notices = Arc::new(RecordingNotifier::new());
        let engine = Arc::new(SyncEngine::new(
            config,
            store,
            remote.clone(),
            connectivity.clone(),
            notices.clone(),
        ));
        Self {
            writer: OfflineWriter::new(Arc::clone(&engine)),
            engine,
            remote,
            connectivity,
            notices,
        }
    }

    /// Online, in memory, flushing only when the test asks.
    pub fn online() -> Self {
        Self::new(
            Arc::new(open_store_in_memory().expect("Failed to open in-memory store")),
            manual_config(),
            true,
        )
    }

    /// Offline, in memory, flushing only when the test asks.
    pub fn offline() -> Self {
        Self::new(
            Arc::new(open_store_in_memory().expect("Failed to open in-memory store")),
            manual_config(),
            false,
        )
    }

    /// Number of queued operations.
    pub fn queued(&self) -> usize {
        self.engine.queue().len().expect("queue readable")
    }
}

/// Engine configuration with every automatic flush turned off.
pub fn manual_config() -> SyncConfig {
    SyncConfig::new()
        .with_flush_on_start(false)
        .with_flush_on_reconnect(false)
        .with_flush_after_write(false)
        .with_flush_interval(Duration::from_secs(3600))
}

/// Polls `check` until it holds.
///
/// # Panics
///
/// Panics if it does not hold within ten seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use crate::samples;
    use hsesync_model::{Collection, OperationKind};

    /// A store with `count` queued incident inserts.
    pub fn populated_queue(count: usize) -> TestStore {
        let store = TestStore::memory();
        let queue = hsesync_engine::OperationQueue::new(Arc::clone(store.store()));
        for n in 0..count {
            queue
                .enqueue(
                    Collection::Incidents,
                    OperationKind::Insert,
                    samples::incident_document(&format!("i-{n:05}")),
                )
                .expect("Failed to enqueue");
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{queue_actions_strategy, QueueAction};
    use hsesync_model::{Collection, OperationKind};
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn memory_store_has_partitions() {
        with_temp_store(|store| {
            assert!(store.has_partition("pending_operations"));
            assert!(store.has_partition("incidents"));
        });
    }

    #[test]
    fn file_store_survives_reopen() {
        let mut store = TestStore::file();
        store
            .put("incidents", json!({"id": "a", "type": "injury"}))
            .unwrap();
        store.reopen();
        assert_eq!(store.count("incidents").unwrap(), 1);
    }

    #[test]
    fn populated_scenario() {
        let store = scenarios::populated_queue(12);
        assert_eq!(store.count("pending_operations").unwrap(), 12);
    }

    fn replay(actions: Vec<QueueAction>) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let h = EngineHarness::online();
        let mut online = true;
        // What the queue and the remote should hold.
        let mut queued: Vec<(Collection, OperationKind, String)> = Vec::new();
        let mut remote: HashSet<(Collection, String)> = HashSet::new();

        for action in actions {
            match action {
                QueueAction::Enqueue {
                    collection,
                    kind,
                    payload,
                } => {
                    let id = payload.id().unwrap().to_string();
                    h.engine.queue().enqueue(collection, kind, payload).unwrap();
                    queued.push((collection, kind, id));
                }
                QueueAction::Flush { failing } => {
                    for id in &failing {
                        h.remote.fail_record(id.clone());
                    }
                    runtime.block_on(h.engine.flush_now()).unwrap();
                    h.remote.heal();
                    if online {
                        queued.retain(|(collection, kind, id)| {
                            let key = (*collection, id.clone());
                            let rejected = failing.contains(id)
                                || (*kind == OperationKind::Insert && remote.contains(&key));
                            if !rejected {
                                match kind {
                                    OperationKind::Insert => {
                                        remote.insert(key);
                                    }
                                    OperationKind::Delete => {
                                        remote.remove(&key);
                                    }
                                    OperationKind::Update => {}
                                }
                            }
                            rejected
                        });
                    }
                }
                QueueAction::SetOnline(value) => {
                    h.connectivity.set_online(value);
                    online = value;
                }
            }
            assert_eq!(h.queued(), queued.len());
        }

        let left: Vec<_> = h
            .engine
            .queue()
            .list_unsynced()
            .unwrap()
            .into_iter()
            .map(|op| op.record_id().unwrap().to_string())
            .collect();
        let expected: Vec<_> = queued.into_iter().map(|(_, _, id)| id).collect();
        assert_eq!(left, expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn queue_matches_model_under_random_actions(actions in queue_actions_strategy(40)) {
            replay(actions);
        }
    }

    #[tokio::test]
    async fn harness_starts_idle() {
        let h = EngineHarness::offline();
        assert_eq!(h.queued(), 0);
        assert!(!h.engine.is_online());
        assert!(h.notices.notices().is_empty());
    }
}
