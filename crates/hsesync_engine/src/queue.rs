//! The pending-operation queue.

use crate::error::SyncResult;
use crate::{PENDING_OPERATIONS, SYNC_ATTEMPTS};
use hsesync_model::{
    now_millis, AttemptRecord, Collection, Document, OperationKind, PendingOperation,
};
use hsesync_store::{LocalStore, StoreResult, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot of the queue for alerting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueHealth {
    /// Operations waiting for the remote.
    pub pending: usize,
    /// Age of the oldest waiting operation.
    pub oldest_age: Option<Duration>,
    /// Highest failed-attempt count of any waiting operation.
    pub max_attempts: u32,
}

/// Durable FIFO of write intents the remote has not confirmed.
///
/// Operations live in the `pending_operations` partition keyed by id, retry
/// bookkeeping in `sync_attempts` keyed by the same id. Two operations for
/// the same record are kept and replayed separately.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    store: Arc<LocalStore>,
}

impl OperationQueue {
    /// Creates a queue over a store that has the queue partitions.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Validates and persists a new operation.
    ///
    /// # Errors
    ///
    /// [`crate::SyncError::Model`] if the payload does not fit the
    /// collection and kind; [`crate::SyncError::StorageUnavailable`] if it
    /// could not be persisted.
    pub fn enqueue(
        &self,
        collection: Collection,
        kind: OperationKind,
        payload: Document,
    ) -> SyncResult<PendingOperation> {
        self.enqueue_with(collection, kind, payload, |_| Ok(()))
    }

    /// Enqueues and applies `also` in the same transaction.
    pub(crate) fn enqueue_with<F>(
        &self,
        collection: Collection,
        kind: OperationKind,
        payload: Document,
        also: F,
    ) -> SyncResult<PendingOperation>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<()>,
    {
        payload.validate_for(collection, kind)?;
        let op = PendingOperation::new(collection, kind, payload);
        let stored = op.to_value()?;
        self.store.transaction(|txn| {
            also(txn)?;
            txn.put_with_key(PENDING_OPERATIONS, &op.id, stored)
        })?;
        debug!(op_id = %op.id, %collection, %kind, "enqueued");
        Ok(op)
    }

    /// Looks up one operation.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable or the stored entry is malformed.
    pub fn get(&self, id: &str) -> SyncResult<Option<PendingOperation>> {
        match self.store.get(PENDING_OPERATIONS, id)? {
            Some(value) => Ok(Some(PendingOperation::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Unsynced operations, oldest first, ties broken by id.
    ///
    /// Entries that do not parse are logged and left in place.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn list_unsynced(&self) -> SyncResult<Vec<PendingOperation>> {
        let mut ops: Vec<PendingOperation> = self
            .store
            .get_all(PENDING_OPERATIONS)?
            .into_iter()
            .filter_map(|value| match PendingOperation::from_value(value) {
                Ok(op) => Some(op),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable pending operation");
                    None
                }
            })
            .filter(|op| !op.synced)
            .collect();
        ops.sort_by(PendingOperation::queue_order);
        Ok(ops)
    }

    /// Removes a confirmed operation and its attempt record.
    ///
    /// Unknown ids are fine.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn mark_synced(&self, id: &str) -> SyncResult<()> {
        self.store.transaction(|txn| {
            txn.delete(PENDING_OPERATIONS, id)?;
            txn.delete(SYNC_ATTEMPTS, id)
        })?;
        debug!(op_id = %id, "synced");
        Ok(())
    }

    /// Counts a failed replay of `id`.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn record_failure(&self, id: &str, error: &str) -> SyncResult<AttemptRecord> {
        let now = now_millis();
        let attempt = match self.attempts(id)? {
            Some(mut attempt) => {
                attempt.bump(now, error);
                attempt
            }
            None => AttemptRecord::first(id, now, error),
        };
        self.store
            .put_with_key(SYNC_ATTEMPTS, id, serde_json::to_value(&attempt)?)?;
        Ok(attempt)
    }

    /// The attempt record of `id`, if it ever failed.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable or the entry is malformed.
    pub fn attempts(&self, id: &str) -> SyncResult<Option<AttemptRecord>> {
        match self.store.get(SYNC_ATTEMPTS, id)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Queue size, age and worst retry count as of `now` (epoch ms).
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn health(&self, now: u64) -> SyncResult<QueueHealth> {
        let ops = self.list_unsynced()?;
        let oldest_age = ops
            .first()
            .map(|op| Duration::from_millis(op.age_millis(now)));
        let mut max_attempts = 0;
        for op in &ops {
            if let Some(attempt) = self.attempts(&op.id)? {
                max_attempts = max_attempts.max(attempt.attempts);
            }
        }
        Ok(QueueHealth {
            pending: ops.len(),
            oldest_age,
            max_attempts,
        })
    }

    /// Operations that failed at least `max_attempts` times, in queue order.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn stale(&self, max_attempts: u32) -> SyncResult<Vec<(PendingOperation, AttemptRecord)>> {
        let mut out = Vec::new();
        for op in self.list_unsynced()? {
            if let Some(attempt) = self.attempts(&op.id)? {
                if attempt.attempts >= max_attempts {
                    out.push((op, attempt));
                }
            }
        }
        Ok(out)
    }

    /// Number of stored operations.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.store.count(PENDING_OPERATIONS)?)
    }

    /// True when nothing is queued.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len()? == 0)
    }
}
