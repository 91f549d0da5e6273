//! Pending operations and their attempt bookkeeping.

use crate::collection::Collection;
use crate::document::Document;
use crate::error::{ModelError, ModelResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// What a pending operation does to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create the record.
    Insert,
    /// Patch fields of the record.
    Update,
    /// Remove the record.
    Delete,
}

impl OperationKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(OperationKind::Insert),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(ModelError::UnknownKind {
                name: other.to_string(),
            }),
        }
    }
}

/// A queued local write that the remote has not confirmed yet.
///
/// Immutable once enqueued. The operation is deleted when the remote
/// accepts it, so a stored operation always has `synced == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Time-ordered unique id.
    pub id: String,
    /// Target collection.
    pub collection: Collection,
    /// Insert, update or delete.
    pub kind: OperationKind,
    /// The record (insert), the patch plus `id` (update) or just `id`
    /// (delete).
    pub payload: Document,
    /// Enqueue time, milliseconds since the Unix epoch.
    pub enqueued_at: u64,
    /// False until replayed.
    pub synced: bool,
}

impl PendingOperation {
    /// Creates an unsynced operation with a fresh id stamped `now`.
    ///
    /// Operations created in this process sort by `(enqueued_at, id)` in
    /// creation order, even within one millisecond or when the wall clock
    /// steps back.
    #[must_use]
    pub fn new(collection: Collection, kind: OperationKind, payload: Document) -> Self {
        let (id, enqueued_at) = next_operation_id(now_millis());
        Self {
            id,
            collection,
            kind,
            payload,
            enqueued_at,
            synced: false,
        }
    }

    /// Id of the record this operation targets.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.payload.id()
    }

    /// Milliseconds between enqueue and `now`.
    #[must_use]
    pub fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.enqueued_at)
    }

    /// Queue order: oldest first, ties broken by id.
    #[must_use]
    pub fn queue_order(&self, other: &Self) -> std::cmp::Ordering {
        self.enqueued_at
            .cmp(&other.enqueued_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Serializes to the stored JSON shape.
    ///
    /// # Errors
    ///
    /// Never fails for well-formed documents; the error is serde's.
    pub fn to_value(&self) -> ModelResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parses the stored JSON shape.
    ///
    /// # Errors
    ///
    /// Fails on unknown collections or kinds and missing fields.
    pub fn from_value(value: serde_json::Value) -> ModelResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Retry bookkeeping for one pending operation.
///
/// Stored beside the operation, keyed by its id, so the operation itself
/// never changes after enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// The operation this describes.
    pub op_id: String,
    /// Failed replays so far.
    pub attempts: u32,
    /// Time of the last failed replay, epoch milliseconds.
    pub last_attempt_at: u64,
    /// Message of the last failure.
    pub last_error: String,
}

impl AttemptRecord {
    /// The record after the first failure.
    #[must_use]
    pub fn first(op_id: impl Into<String>, at: u64, error: impl Into<String>) -> Self {
        Self {
            op_id: op_id.into(),
            attempts: 1,
            last_attempt_at: at,
            last_error: error.into(),
        }
    }

    /// Counts one more failure.
    pub fn bump(&mut self, at: u64, error: impl Into<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = at;
        self.last_error = error.into();
    }
}

static LAST_ISSUED: Mutex<(u64, u16)> = parking_lot::const_mutex((0, 0));

/// Issues a UUID v7 and the millisecond it is stamped with.
///
/// The 12 bits after the version nibble hold a per-millisecond counter, so
/// ids issued in the same millisecond still sort in issue order. The stamp
/// never goes below the previous one.
fn next_operation_id(now: u64) -> (String, u64) {
    let mut last = LAST_ISSUED.lock();
    let (mut millis, mut counter) = *last;
    if now > millis {
        millis = now;
        counter = 0;
    } else {
        counter += 1;
        if counter > 0x0FFF {
            millis += 1;
            counter = 0;
        }
    }
    *last = (millis, counter);
    drop(last);

    let mut random = [0u8; 10];
    random.copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..10]);
    random[0] = (random[0] & 0xF0) | ((counter >> 8) as u8 & 0x0F);
    random[1] = (counter & 0xFF) as u8;
    let id = uuid::Builder::from_unix_timestamp_millis(millis, &random).into_uuid();
    (id.to_string(), millis)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
