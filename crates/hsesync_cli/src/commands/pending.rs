//! Pending command implementation.

use super::{format_age, open_existing};
use hsesync_engine::OperationQueue;
use hsesync_model::now_millis;
use serde::Serialize;
use std::path::Path;

/// One unsynced operation for output.
#[derive(Debug, Serialize)]
pub struct PendingInfo {
    /// Operation id.
    pub id: String,
    /// Target collection.
    pub collection: String,
    /// insert, update or delete.
    pub kind: String,
    /// Id of the record the operation touches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Milliseconds since the operation was queued.
    pub age_ms: u64,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Error from the most recent failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Runs the pending command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ops = list(path, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&ops)?);
        }
        _ => {
            print_text_output(&ops);
        }
    }

    Ok(())
}

/// Lists unsynced operations in replay order.
pub fn list(
    path: &Path,
    limit: Option<usize>,
) -> Result<Vec<PendingInfo>, Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let queue = OperationQueue::new(store);
    let now = now_millis();
    let max_ops = limit.unwrap_or(usize::MAX);

    let mut out = Vec::new();
    for op in queue.list_unsynced()?.into_iter().take(max_ops) {
        let attempts = queue.attempts(&op.id)?;
        out.push(PendingInfo {
            collection: op.collection.name().to_string(),
            kind: op.kind.to_string(),
            record_id: op.record_id().map(str::to_string),
            age_ms: op.age_millis(now),
            attempts: attempts.as_ref().map_or(0, |a| a.attempts),
            last_error: attempts.map(|a| a.last_error),
            id: op.id,
        });
    }
    Ok(out)
}

fn print_text_output(ops: &[PendingInfo]) {
    if ops.is_empty() {
        println!("No pending operations");
        return;
    }

    println!(
        "{:<38} {:<22} {:<7} {:<16} {:>8} {:>8}",
        "ID", "COLLECTION", "KIND", "RECORD", "AGE", "ATTEMPTS"
    );
    for op in ops {
        println!(
            "{:<38} {:<22} {:<7} {:<16} {:>8} {:>8}",
            op.id,
            op.collection,
            op.kind,
            op.record_id.as_deref().unwrap_or("-"),
            format_age(op.age_ms),
            op.attempts
        );
        if let Some(error) = &op.last_error {
            println!("    last error: {}", error);
        }
    }
    println!();
    println!("{} operation(s)", ops.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seeded_store;

    #[test]
    fn lists_in_queue_order_with_attempts() {
        let (_dir, path) = seeded_store();
        let ops = list(&path, None).unwrap();

        let records: Vec<_> = ops.iter().map(|o| o.record_id.as_deref()).collect();
        assert_eq!(records, vec![Some("i-3"), Some("i-4"), Some("i-5")]);
        assert_eq!(ops[0].attempts, 2);
        assert_eq!(ops[0].last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(ops[1].attempts, 0);
        assert!(ops.iter().all(|o| o.kind == "insert" && o.collection == "incidents"));
    }

    #[test]
    fn limit_truncates() {
        let (_dir, path) = seeded_store();
        assert_eq!(list(&path, Some(2)).unwrap().len(), 2);
        assert!(list(&path, Some(0)).unwrap().is_empty());
    }
}
