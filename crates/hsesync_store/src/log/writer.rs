//! Log writer.

use super::record::LogRecord;
use crate::error::StoreResult;
use hsesync_storage::{StorageBackend, StorageResult};

/// Appends whole transactions to a backend.
///
/// A transaction's frames are encoded into one buffer and handed to the
/// backend in a single `append`, so a crash leaves at most one torn
/// transaction at the tail.
pub struct LogWriter {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl LogWriter {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Appends the records as one unit and makes them durable.
    ///
    /// Returns the offset the first frame landed at. If the write fails the
    /// log is cut back to its previous length so later transactions do not
    /// land behind a half-written one.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors.
    pub fn append_all(&mut self, records: &[LogRecord]) -> StoreResult<u64> {
        let mut buf = Vec::new();
        for record in records {
            buf.extend_from_slice(&record.encode()?);
        }

        let before = self.backend.size()?;
        match self.write_durably(&buf) {
            Ok(offset) => Ok(offset),
            Err(e) => {
                if let Err(cleanup) = self.backend.truncate(before) {
                    tracing::warn!(error = %cleanup, "could not roll back failed log append");
                }
                Err(e.into())
            }
        }
    }

    fn write_durably(&mut self, buf: &[u8]) -> StorageResult<u64> {
        let offset = self.backend.append(buf)?;
        self.backend.flush()?;
        if self.sync_on_commit {
            self.backend.sync()?;
        }
        Ok(offset)
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot report its size.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Drops everything from `offset` on.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn truncate(&mut self, offset: u64) -> StoreResult<()> {
        self.backend.truncate(offset)?;
        Ok(())
    }

    /// Forces appended bytes to durable media.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Replaces the whole log with `bytes` and syncs.
    ///
    /// Not atomic: a failure part way leaves the backend holding anything
    /// from nothing to all of `bytes`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn rewrite(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.backend.truncate(0)?;
        self.backend.append(bytes)?;
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    /// The underlying backend.
    pub fn backend(&self) -> &dyn StorageBackend {
        &*self.backend
    }

    /// Swaps in a new backend and returns the old one.
    pub fn replace_backend(&mut self, backend: Box<dyn StorageBackend>) -> Box<dyn StorageBackend> {
        std::mem::replace(&mut self.backend, backend)
    }

    /// Unwraps the backend.
    pub fn into_backend(self) -> Box<dyn StorageBackend> {
        self.backend
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}
