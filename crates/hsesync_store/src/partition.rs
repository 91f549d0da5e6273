//! Partition names.

use crate::error::{StoreError, StoreResult};

/// Longest accepted partition name in bytes.
pub const MAX_PARTITION_NAME_LEN: usize = 128;

/// Checks that `name` is usable as a partition name.
///
/// Names are lowercase ASCII letters, digits and `_`, starting with a
/// letter, e.g. `pending_operations` or `ppe_issuances`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidRecord`] describing the problem.
pub fn validate_partition_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_record("partition name is empty"));
    }
    if name.len() > MAX_PARTITION_NAME_LEN {
        return Err(StoreError::invalid_record(format!(
            "partition name longer than {MAX_PARTITION_NAME_LEN} bytes: {name}"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(StoreError::invalid_record(format!(
            "partition name must start with a lowercase letter: {name}"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
    {
        return Err(StoreError::invalid_record(format!(
            "invalid character {bad:?} in partition name {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_collection_names() {
        for name in ["pending_operations", "sync_attempts", "ppe_issuances", "r2"] {
            assert!(validate_partition_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "Incidents", "_x", "9lives", "a-b", "a b"] {
            assert!(validate_partition_name(name).is_err(), "{name:?}");
        }
        assert!(validate_partition_name(&"a".repeat(MAX_PARTITION_NAME_LEN + 1)).is_err());
    }
}
