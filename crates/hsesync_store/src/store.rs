//! The store facade: recovery, commits, reads and compaction.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::log::{LogReader, LogRecord, LogWriter};
use crate::partition::validate_partition_name;
use crate::txn::{Transaction, WriteOp};
use hsesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

type PartitionMap = BTreeMap<String, BTreeMap<String, Value>>;

/// Per-partition record counts and log size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Bytes in the transaction log.
    pub log_size: u64,
    /// Records per partition.
    pub partitions: BTreeMap<String, usize>,
    /// Id the next committed transaction will get.
    pub next_txid: u64,
}

impl StoreStats {
    /// Records across all partitions.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.partitions.values().sum()
    }
}

/// Result of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before.
    pub before: u64,
    /// Log size after.
    pub after: u64,
    /// Records written to the snapshot.
    pub records: usize,
}

struct LogState {
    writer: LogWriter,
    next_txid: u64,
}

/// The local durable store.
///
/// Records are JSON values grouped into named partitions and keyed by a
/// string. Every write goes through a transaction that is appended to the
/// log before it becomes visible, so a reader never sees a half-applied
/// transaction and a crash never loses an acknowledged one.
///
/// ```rust
/// use hsesync_store::{LocalStore, StoreConfig};
/// use serde_json::json;
///
/// let store = LocalStore::open_in_memory(StoreConfig::new().partitions(["incidents"])).unwrap();
/// store.put("incidents", json!({"id": "i-1", "title": "Slip in warehouse"})).unwrap();
/// assert_eq!(store.get_all("incidents").unwrap().len(), 1);
/// ```
pub struct LocalStore {
    config: StoreConfig,
    dir: Option<StoreDir>,
    partitions: BTreeSet<String>,
    state: RwLock<PartitionMap>,
    log: Mutex<LogState>,
    open: AtomicBool,
}

impl LocalStore {
    /// Opens or creates a store in `path`.
    ///
    /// Takes the directory lock, drops any snapshot a crashed compaction
    /// left behind, replays the log and cuts off a torn tail.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Locked`] if another process has the directory
    /// - [`StoreError::Io`] / [`StoreError::StorageUnavailable`] when the
    ///   directory or log cannot be used
    /// - [`StoreError::Corrupted`] / [`StoreError::ChecksumMismatch`] when
    ///   the log is damaged
    pub fn open(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        if dir.discard_stale_snapshot()? {
            tracing::warn!(path = %path.display(), "discarded unfinished compaction snapshot");
        }
        let backend = FileBackend::open(&dir.log_path())?;
        Self::open_inner(Box::new(backend), config, Some(dir))
    }

    /// Opens a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Fails only on an invalid partition name.
    pub fn open_in_memory(config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), config)
    }

    /// Opens a store on an arbitrary backend, replaying what it holds.
    ///
    /// # Errors
    ///
    /// Same as [`LocalStore::open`] minus the directory errors.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        Self::open_inner(backend, config, None)
    }

    fn open_inner(
        mut backend: Box<dyn StorageBackend>,
        config: StoreConfig,
        dir: Option<StoreDir>,
    ) -> StoreResult<Self> {
        let mut partitions = BTreeSet::new();
        for name in &config.partitions {
            validate_partition_name(name)?;
            partitions.insert(name.clone());
        }

        let recovered = recover(&*backend)?;
        if recovered.valid_end < recovered.size {
            tracing::warn!(
                valid_end = recovered.valid_end,
                size = recovered.size,
                "truncating torn log tail"
            );
            backend.truncate(recovered.valid_end)?;
        }
        if recovered.discarded > 0 {
            tracing::warn!(
                transactions = recovered.discarded,
                "dropped uncommitted transactions during recovery"
            );
        }

        let mut state = recovered.state;
        for name in state.keys() {
            if partitions.insert(name.clone()) {
                tracing::debug!(partition = %name, "keeping undeclared partition found in log");
            }
        }
        for name in &partitions {
            state.entry(name.clone()).or_default();
        }

        tracing::info!(
            path = ?dir.as_ref().map(StoreDir::path),
            transactions = recovered.committed,
            records = state.values().map(BTreeMap::len).sum::<usize>(),
            log_size = recovered.valid_end,
            "store opened"
        );

        let writer = LogWriter::new(backend, config.sync_on_commit);
        Ok(Self {
            config,
            dir,
            partitions,
            state: RwLock::new(state),
            log: Mutex::new(LogState {
                writer,
                next_txid: recovered.max_txid + 1,
            }),
            open: AtomicBool::new(true),
        })
    }

    /// Runs `f` in a transaction and commits its writes atomically.
    ///
    /// Nothing is written when `f` returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the commit's.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        self.ensure_open()?;
        let mut txn = Transaction::new(&self.partitions, &self.config.key_field);
        let out = f(&mut txn)?;
        self.commit(txn.into_ops())?;
        Ok(out)
    }

    /// Upserts one record keyed by its key field.
    ///
    /// # Errors
    ///
    /// See [`Transaction::put`] and [`LocalStore::transaction`].
    pub fn put(&self, partition: &str, value: Value) -> StoreResult<()> {
        self.transaction(|txn| txn.put(partition, value))
    }

    /// Upserts one record under an explicit key.
    ///
    /// # Errors
    ///
    /// See [`Transaction::put_with_key`].
    pub fn put_with_key(&self, partition: &str, key: &str, value: Value) -> StoreResult<()> {
        self.transaction(|txn| txn.put_with_key(partition, key, value))
    }

    /// Removes one record; absent keys are fine.
    ///
    /// # Errors
    ///
    /// See [`Transaction::delete`].
    pub fn delete(&self, partition: &str, key: &str) -> StoreResult<()> {
        self.transaction(|txn| txn.delete(partition, key))
    }

    /// Removes every record in a partition.
    ///
    /// # Errors
    ///
    /// See [`Transaction::clear`].
    pub fn clear(&self, partition: &str) -> StoreResult<()> {
        self.transaction(|txn| txn.clear(partition))
    }

    /// Replaces the content of a partition in one transaction.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if any record lacks a key.
    pub fn replace_all<I>(&self, partition: &str, records: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = Value>,
    {
        self.transaction(|txn| {
            txn.clear(partition)?;
            for record in records {
                txn.put(partition, record)?;
            }
            Ok(())
        })
    }

    /// Looks up one record.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPartition`] or [`StoreError::Closed`].
    pub fn get(&self, partition: &str, key: &str) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        let state = self.state.read();
        let records = partition_of(&state, partition)?;
        Ok(records.get(key).cloned())
    }

    /// All records of a partition in ascending key order.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPartition`] or [`StoreError::Closed`].
    pub fn get_all(&self, partition: &str) -> StoreResult<Vec<Value>> {
        self.ensure_open()?;
        let state = self.state.read();
        let records = partition_of(&state, partition)?;
        Ok(records.values().cloned().collect())
    }

    /// Number of records in a partition.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPartition`] or [`StoreError::Closed`].
    pub fn count(&self, partition: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(partition_of(&state, partition)?.len())
    }

    /// Names of all partitions.
    #[must_use]
    pub fn partitions(&self) -> Vec<String> {
        self.partitions.iter().cloned().collect()
    }

    /// True if `name` is a partition of this store.
    #[must_use]
    pub fn has_partition(&self, name: &str) -> bool {
        self.partitions.contains(name)
    }

    /// The store directory, if the store is on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Record counts and log size.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] or a backend error.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.ensure_open()?;
        let log = self.log.lock();
        let log_size = log.writer.size()?;
        let partitions = self
            .state
            .read()
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();
        Ok(StoreStats {
            log_size,
            partitions,
            next_txid: log.next_txid,
        })
    }

    /// Rewrites the log as one snapshot transaction of the current state.
    ///
    /// On disk the snapshot is written next to the log, synced, and renamed
    /// over it, so a crash leaves either the old or the new log in place.
    /// Other backends get the snapshot appended behind the log before the
    /// old prefix is cut.
    ///
    /// # Errors
    ///
    /// I/O errors; the old log stays authoritative when one occurs. If the
    /// old log cannot be put back the store is closed.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        self.ensure_open()?;
        let mut log = self.log.lock();
        self.compact_locked(&mut log)
    }

    /// Syncs the log and refuses further use.
    ///
    /// The directory lock is held until the store is dropped.
    ///
    /// # Errors
    ///
    /// Fails if the final sync fails.
    pub fn close(&self) -> StoreResult<()> {
        let mut log = self.log.lock();
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        log.writer.sync()
    }

    /// True until [`LocalStore::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn commit(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut log = self.log.lock();
        self.ensure_open()?;

        let txid = log.next_txid;
        log.next_txid += 1;

        let mut records = Vec::with_capacity(ops.len() + 2);
        records.push(LogRecord::Begin { txid });
        for op in &ops {
            records.push(to_log_record(txid, op)?);
        }
        records.push(LogRecord::Commit { txid });
        log.writer.append_all(&records)?;

        {
            let mut state = self.state.write();
            for op in ops {
                apply(&mut state, op);
            }
        }
        tracing::debug!(txid, writes = records.len() - 2, "transaction committed");

        let threshold = self.config.compact_threshold;
        if threshold > 0 && log.writer.size()? > threshold {
            if let Err(e) = self.compact_locked(&mut log) {
                if !self.is_open() {
                    return Err(e);
                }
                tracing::warn!(error = %e, "automatic compaction failed");
            }
        }
        Ok(())
    }

    fn compact_locked(&self, log: &mut LogState) -> StoreResult<CompactionStats> {
        let before = log.writer.size()?;
        let txid = log.next_txid;
        log.next_txid += 1;

        let mut records = vec![LogRecord::Begin { txid }];
        let mut count = 0;
        {
            let state = self.state.read();
            for (partition, entries) in state.iter() {
                records.push(LogRecord::Clear {
                    txid,
                    partition: partition.clone(),
                });
                for (key, value) in entries {
                    records.push(LogRecord::Put {
                        txid,
                        partition: partition.clone(),
                        key: key.clone(),
                        value: encode_value(value)?,
                    });
                    count += 1;
                }
            }
        }
        records.push(LogRecord::Commit { txid });

        match &self.dir {
            Some(dir) => {
                let compact_path = dir.compact_path();
                let mut snapshot = FileBackend::open(&compact_path)?;
                snapshot.truncate(0)?;
                let mut writer = LogWriter::new(Box::new(snapshot), true);
                writer.append_all(&records)?;
                fs::rename(&compact_path, dir.log_path())?;
                // The snapshot handle follows the renamed file.
                drop(log.writer.replace_backend(writer.into_backend()));
            }
            None => self.compact_in_place(log, &records)?,
        }

        let after = log.writer.size()?;
        tracing::info!(before, after, records = count, "log compacted");
        Ok(CompactionStats {
            before,
            after,
            records: count,
        })
    }

    /// Compacts a backend that cannot be swapped for a fresh file.
    ///
    /// The snapshot goes behind the live log first; replaying both yields the
    /// same state, so any failure up to there leaves a valid log. Only once
    /// the snapshot is synced is the prefix cut. If that cut fails the old
    /// bytes are written back, and if even that fails the store closes so no
    /// later write is acknowledged on a damaged log.
    fn compact_in_place(&self, log: &mut LogState, records: &[LogRecord]) -> StoreResult<()> {
        let start = log.writer.append_all(records)?;
        log.writer.sync()?;
        let image = log.writer.backend().read_all()?;
        let offset = usize::try_from(start)
            .map_err(|_| StoreError::corrupted(format!("snapshot offset {start} out of range")))?;
        let Some(snapshot) = image.get(offset..) else {
            return Err(StoreError::corrupted(format!(
                "snapshot offset {start} past end of log"
            )));
        };

        if let Err(e) = log.writer.rewrite(snapshot) {
            tracing::warn!(error = %e, "cutting compacted log failed, restoring");
            if let Err(restore) = log.writer.rewrite(&image) {
                self.open.store(false, Ordering::SeqCst);
                tracing::error!(error = %restore, "could not restore log, store closed");
            }
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path())
            .field("partitions", &self.partitions)
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn partition_of<'a>(
    state: &'a PartitionMap,
    partition: &str,
) -> StoreResult<&'a BTreeMap<String, Value>> {
    state.get(partition).ok_or_else(|| StoreError::UnknownPartition {
        name: partition.to_string(),
    })
}

fn apply(state: &mut PartitionMap, op: WriteOp) {
    match op {
        WriteOp::Put {
            partition,
            key,
            value,
        } => {
            state.entry(partition).or_default().insert(key, value);
        }
        WriteOp::Delete { partition, key } => {
            if let Some(records) = state.get_mut(&partition) {
                records.remove(&key);
            }
        }
        WriteOp::Clear { partition } => {
            state.entry(partition).or_default().clear();
        }
    }
}

fn to_log_record(txid: u64, op: &WriteOp) -> StoreResult<LogRecord> {
    Ok(match op {
        WriteOp::Put {
            partition,
            key,
            value,
        } => LogRecord::Put {
            txid,
            partition: partition.clone(),
            key: key.clone(),
            value: encode_value(value)?,
        },
        WriteOp::Delete { partition, key } => LogRecord::Delete {
            txid,
            partition: partition.clone(),
            key: key.clone(),
        },
        WriteOp::Clear { partition } => LogRecord::Clear {
            txid,
            partition: partition.clone(),
        },
    })
}

fn from_log_record(record: LogRecord) -> StoreResult<Option<WriteOp>> {
    Ok(match record {
        LogRecord::Put {
            partition,
            key,
            value,
            ..
        } => Some(WriteOp::Put {
            partition,
            key,
            value: decode_value(&value)?,
        }),
        LogRecord::Delete { partition, key, .. } => Some(WriteOp::Delete { partition, key }),
        LogRecord::Clear { partition, .. } => Some(WriteOp::Clear { partition }),
        LogRecord::Begin { .. } | LogRecord::Commit { .. } => None,
    })
}

/// Encodes a record value as CBOR.
pub(crate) fn encode_value(value: &Value) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(buf)
}

/// Decodes a CBOR record value.
pub(crate) fn decode_value(bytes: &[u8]) -> StoreResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

struct Recovered {
    state: PartitionMap,
    max_txid: u64,
    committed: usize,
    discarded: usize,
    valid_end: u64,
    size: u64,
}

fn recover(backend: &dyn StorageBackend) -> StoreResult<Recovered> {
    let mut reader = LogReader::new(backend)?;
    let mut open_txns: HashMap<u64, Vec<WriteOp>> = HashMap::new();
    let mut state = PartitionMap::new();
    let mut max_txid = 0;
    let mut committed = 0;

    for item in reader.by_ref() {
        let (_, record) = item?;
        let txid = record.txid();
        max_txid = max_txid.max(txid);

        match record {
            LogRecord::Begin { .. } => {
                open_txns.insert(txid, Vec::new());
            }
            LogRecord::Commit { .. } => {
                if let Some(ops) = open_txns.remove(&txid) {
                    for op in ops {
                        apply(&mut state, op);
                    }
                    committed += 1;
                }
            }
            other => {
                if let Some(ops) = open_txns.get_mut(&txid) {
                    if let Some(op) = from_log_record(other)? {
                        ops.push(op);
                    }
                }
            }
        }
    }

    Ok(Recovered {
        state,
        max_txid,
        committed,
        discarded: open_txns.len(),
        valid_end: reader.valid_end(),
        size: reader.size(),
    })
}
