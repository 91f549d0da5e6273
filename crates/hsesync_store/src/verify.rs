//! Offline integrity check of a store log.

use crate::dir::LOG_FILE;
use crate::error::{StoreError, StoreResult};
use crate::log::{LogReader, LogRecord};
use hsesync_storage::{FileBackend, StorageBackend};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// What a scan of the log found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Well-formed records.
    pub records: usize,
    /// Transactions with a `Commit`.
    pub committed: usize,
    /// Transactions without a `Commit`.
    pub incomplete: usize,
    /// Bytes up to the end of the last whole record.
    pub valid_bytes: u64,
    /// Size of the log file.
    pub total_bytes: u64,
    /// Put/Delete/Clear records per partition.
    pub writes_per_partition: BTreeMap<String, usize>,
}

impl VerifyReport {
    /// Bytes of a torn final write that recovery would cut off.
    #[must_use]
    pub fn torn_bytes(&self) -> u64 {
        self.total_bytes - self.valid_bytes
    }

    /// True when the log opens without losing anything.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.incomplete == 0 && self.torn_bytes() == 0
    }
}

/// Scans the log in `path` without opening the store.
///
/// `path` may be a store directory or the log file itself. The store lock is
/// not taken, so a live store can be checked.
///
/// # Errors
///
/// - [`StoreError::Io`] if there is no log at `path`
/// - [`StoreError::Corrupted`] / [`StoreError::ChecksumMismatch`] with the
///   offset of the first damaged record
pub fn verify(path: &Path) -> StoreResult<VerifyReport> {
    let log_path = if path.is_dir() {
        path.join(LOG_FILE)
    } else {
        path.to_path_buf()
    };
    if !log_path.is_file() {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no store log at {}", log_path.display()),
        )));
    }

    let backend = FileBackend::open(&log_path)?;
    verify_backend(&backend)
}

/// Scans the log held by `backend`.
///
/// # Errors
///
/// See [`verify`].
pub fn verify_backend(backend: &dyn StorageBackend) -> StoreResult<VerifyReport> {
    let mut reader = LogReader::new(backend)?;
    let mut report = VerifyReport::default();
    let mut open = HashSet::new();

    for item in reader.by_ref() {
        let (_, record) = item?;
        report.records += 1;
        match &record {
            LogRecord::Begin { txid } => {
                open.insert(*txid);
            }
            LogRecord::Commit { txid } => {
                if open.remove(txid) {
                    report.committed += 1;
                }
            }
            LogRecord::Put { partition, .. }
            | LogRecord::Delete { partition, .. }
            | LogRecord::Clear { partition, .. } => {
                *report
                    .writes_per_partition
                    .entry(partition.clone())
                    .or_default() += 1;
            }
        }
    }

    report.incomplete = open.len();
    report.valid_bytes = reader.valid_end();
    report.total_bytes = reader.size();
    Ok(report)
}
