//! Write transactions.

use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::collections::BTreeSet;

/// One buffered write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Upsert `value` under `key`.
    Put {
        /// Target partition.
        partition: String,
        /// Record key.
        key: String,
        /// The record.
        value: Value,
    },
    /// Remove `key`.
    Delete {
        /// Target partition.
        partition: String,
        /// Record key.
        key: String,
    },
    /// Remove everything in the partition.
    Clear {
        /// Target partition.
        partition: String,
    },
}

/// A batch of writes that commits atomically.
///
/// Obtained through [`crate::LocalStore::transaction`]. Writes are buffered
/// and only reach the log and the visible state when the closure returns
/// `Ok`; on `Err` nothing is written.
#[derive(Debug)]
pub struct Transaction<'a> {
    partitions: &'a BTreeSet<String>,
    key_field: &'a str,
    ops: Vec<WriteOp>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(partitions: &'a BTreeSet<String>, key_field: &'a str) -> Self {
        Self {
            partitions,
            key_field,
            ops: Vec::new(),
        }
    }

    /// Upserts a record keyed by its key field (`id` by default).
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownPartition`] for an undeclared partition
    /// - [`StoreError::InvalidRecord`] when the key field is missing, empty or
    ///   not a string
    pub fn put(&mut self, partition: &str, value: Value) -> StoreResult<()> {
        let key = record_key(&value, self.key_field)?;
        self.put_with_key(partition, key, value)
    }

    /// Upserts a record under an explicit key.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPartition`] for an undeclared partition.
    pub fn put_with_key(
        &mut self,
        partition: &str,
        key: impl Into<String>,
        value: Value,
    ) -> StoreResult<()> {
        self.check(partition)?;
        self.ops.push(WriteOp::Put {
            partition: partition.to_string(),
            key: key.into(),
            value,
        });
        Ok(())
    }

    /// Removes a record. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPartition`] for an undeclared partition.
    pub fn delete(&mut self, partition: &str, key: &str) -> StoreResult<()> {
        self.check(partition)?;
        self.ops.push(WriteOp::Delete {
            partition: partition.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    /// Removes every record in a partition.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPartition`] for an undeclared partition.
    pub fn clear(&mut self, partition: &str) -> StoreResult<()> {
        self.check(partition)?;
        self.ops.push(WriteOp::Clear {
            partition: partition.to_string(),
        });
        Ok(())
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    fn check(&self, partition: &str) -> StoreResult<()> {
        if self.partitions.contains(partition) {
            Ok(())
        } else {
            Err(StoreError::UnknownPartition {
                name: partition.to_string(),
            })
        }
    }
}

/// Extracts the string key of `value` from `key_field`.
///
/// # Errors
///
/// [`StoreError::InvalidRecord`] if the value is not an object or the field
/// is missing, empty or not a string.
pub fn record_key(value: &Value, key_field: &str) -> StoreResult<String> {
    let object = value
        .as_object()
        .ok_or_else(|| StoreError::invalid_record("record is not a JSON object"))?;
    match object.get(key_field) {
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(Value::String(_)) => Err(StoreError::invalid_record(format!(
            "record field '{key_field}' is empty"
        ))),
        Some(_) => Err(StoreError::invalid_record(format!(
            "record field '{key_field}' is not a string"
        ))),
        None => Err(StoreError::invalid_record(format!(
            "record has no '{key_field}' field"
        ))),
    }
}
