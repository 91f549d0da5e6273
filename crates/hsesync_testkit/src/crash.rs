//! Crash simulation for the local store.
//!
//! [`FaultyBackend`] keeps its bytes in memory and can be told to die part
//! way through an append, leaving a torn write behind exactly like a power
//! cut would. The bytes stay reachable through a [`FaultHandle`] after the
//! backend has been handed to a store, so a test can "reboot" by opening a
//! fresh store over them.
//!
//! ```rust,ignore
//! let (backend, handle) = FaultyBackend::new();
//! let store = LocalStore::open_with_backend(Box::new(backend), store_config())?;
//! handle.crash_after(40);
//! assert!(store.put("incidents", record).is_err());
//! let recovered = handle.reboot()?;
//! ```

use hsesync_engine::store_config;
use hsesync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use hsesync_store::{LocalStore, StoreResult};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Shared {
    data: Mutex<Vec<u8>>,
    crash_at: AtomicU64,
    crashed: AtomicBool,
    fail_sync: AtomicBool,
}

/// Controls a [`FaultyBackend`] and reads what it left behind.
#[derive(Debug, Clone)]
pub struct FaultHandle {
    shared: Arc<Shared>,
}

impl FaultHandle {
    /// Crashes once the backend holds `size` bytes; the append crossing that
    /// point is cut there.
    pub fn crash_at_size(&self, size: u64) {
        self.shared.crash_at.store(size, Ordering::SeqCst);
    }

    /// Crashes `bytes` bytes past the current end.
    pub fn crash_after(&self, bytes: u64) {
        let size = self.shared.data.lock().len() as u64;
        self.crash_at_size(size + bytes);
    }

    /// Makes `sync` fail without losing data.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.shared.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// True once the simulated crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.shared.crashed.load(Ordering::SeqCst)
    }

    /// The bytes on "disk".
    pub fn bytes(&self) -> Vec<u8> {
        self.shared.data.lock().clone()
    }

    /// Opens a fresh store with the standard partitions over the surviving
    /// bytes.
    ///
    /// # Errors
    ///
    /// Whatever recovery reports, e.g. corruption.
    pub fn reboot(&self) -> StoreResult<LocalStore> {
        LocalStore::open_with_backend(
            Box::new(InMemoryBackend::with_data(self.bytes())),
            store_config(),
        )
    }
}

/// An in-memory backend that can simulate a crash mid-append.
///
/// After the crash every call fails, so the store cannot clean up the torn
/// bytes itself.
#[derive(Debug)]
pub struct FaultyBackend {
    shared: Arc<Shared>,
}

impl FaultyBackend {
    /// Creates an empty backend and its control handle.
    pub fn new() -> (Self, FaultHandle) {
        Self::with_data(Vec::new())
    }

    /// Creates a backend preloaded with `data`.
    pub fn with_data(data: Vec<u8>) -> (Self, FaultHandle) {
        let shared = Arc::new(Shared {
            data: Mutex::new(data),
            crash_at: AtomicU64::new(u64::MAX),
            crashed: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FaultHandle { shared },
        )
    }

    fn check(&self) -> StorageResult<()> {
        if self.shared.crashed.load(Ordering::SeqCst) {
            return Err(crashed());
        }
        Ok(())
    }
}

fn crashed() -> StorageError {
    StorageError::Io(io::Error::other("simulated crash"))
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.check()?;
        let data = self.shared.data.lock();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.check()?;
        let mut data = self.shared.data.lock();
        let offset = data.len() as u64;
        let crash_at = self.shared.crash_at.load(Ordering::SeqCst);
        let end = offset + bytes.len() as u64;
        if end > crash_at {
            let keep = crash_at.saturating_sub(offset) as usize;
            data.extend_from_slice(&bytes[..keep.min(bytes.len())]);
            self.shared.crashed.store(true, Ordering::SeqCst);
            return Err(crashed());
        }
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check()?;
        if self.shared.fail_sync.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other("simulated sync failure")));
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        self.check()?;
        Ok(self.shared.data.lock().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check()?;
        let mut data = self.shared.data.lock();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open(backend: FaultyBackend) -> LocalStore {
        LocalStore::open_with_backend(Box::new(backend), store_config()).unwrap()
    }

    #[test]
    fn crash_mid_commit_loses_only_that_commit() {
        let (backend, handle) = FaultyBackend::new();
        let store = open(backend);
        store
            .put("incidents", json!({"id": "a", "type": "injury"}))
            .unwrap();

        handle.crash_after(20);
        assert!(store
            .put("incidents", json!({"id": "b", "type": "injury"}))
            .is_err());
        assert!(handle.has_crashed());

        let recovered = handle.reboot().unwrap();
        assert_eq!(recovered.count("incidents").unwrap(), 1);
        assert!(recovered.get("incidents", "a").unwrap().is_some());
    }

    #[test]
    fn failed_sync_keeps_bytes_but_reports_error() {
        let (backend, handle) = FaultyBackend::new();
        let store = open(backend);
        handle.set_fail_on_sync(true);
        assert!(store
            .put("incidents", json!({"id": "a", "type": "injury"}))
            .is_err());
        assert!(!handle.has_crashed());
    }

    #[test]
    fn failed_compaction_keeps_committed_records() {
        let (backend, handle) = FaultyBackend::new();
        let store = open(backend);
        for id in ["a", "b", "c"] {
            store
                .put("incidents", json!({"id": id, "type": "injury"}))
                .unwrap();
        }
        let image = handle.bytes();

        handle.set_fail_on_sync(true);
        assert!(store.compact().is_err());
        assert_eq!(handle.bytes(), image);

        handle.set_fail_on_sync(false);
        store
            .put("incidents", json!({"id": "d", "type": "injury"}))
            .unwrap();

        let recovered = handle.reboot().unwrap();
        assert_eq!(recovered.count("incidents").unwrap(), 4);
        for id in ["a", "b", "c", "d"] {
            assert!(recovered.get("incidents", id).unwrap().is_some(), "{id}");
        }
    }

    #[test]
    fn compaction_in_place_survives_reboot() {
        let (backend, handle) = FaultyBackend::new();
        let store = open(backend);
        for n in 0..10 {
            store
                .put("incidents", json!({"id": "same", "revision": n}))
                .unwrap();
        }
        let before = handle.bytes().len();

        store.compact().unwrap();
        assert!(handle.bytes().len() < before);

        let recovered = handle.reboot().unwrap();
        assert_eq!(
            recovered.get("incidents", "same").unwrap(),
            Some(json!({"id": "same", "revision": 9}))
        );
        assert_eq!(recovered.count("incidents").unwrap(), 1);
    }

    #[test]
    fn every_cut_point_recovers_a_committed_prefix() {
        let (backend, handle) = FaultyBackend::new();
        let store = open(backend);
        let mut boundaries = vec![0u64];
        for n in 0..3 {
            store
                .put("incidents", json!({"id": format!("i-{n}"), "type": "near_miss"}))
                .unwrap();
            boundaries.push(handle.bytes().len() as u64);
        }
        drop(store);
        let image = handle.bytes();

        for cut in 0..=image.len() {
            let (_, cut_handle) = FaultyBackend::with_data(image[..cut].to_vec());
            let recovered = cut_handle.reboot().unwrap();
            let committed = boundaries.iter().filter(|b| **b as usize <= cut).count() - 1;
            assert_eq!(
                recovered.count("incidents").unwrap(),
                committed,
                "cut at byte {cut}"
            );
        }
    }
}
