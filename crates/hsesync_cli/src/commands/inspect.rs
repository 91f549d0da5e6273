//! Inspect command implementation.

use super::{format_age, format_size, open_existing};
use hsesync_engine::{OperationQueue, PENDING_OPERATIONS, SYNC_ATTEMPTS};
use hsesync_model::now_millis;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Log size in bytes.
    pub log_size: u64,
    /// Live records across all partitions.
    pub total_records: usize,
    /// Operations waiting for the remote.
    pub pending: usize,
    /// Age of the oldest pending operation in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending_ms: Option<u64>,
    /// Highest failed-attempt count in the queue.
    pub max_attempts: u32,
    /// Record counts per partition.
    pub partitions: Vec<PartitionStats>,
}

/// Statistics for a single partition.
#[derive(Debug, Serialize)]
pub struct PartitionStats {
    /// Partition name.
    pub name: String,
    /// Number of records.
    pub records: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects the inspection result without printing it.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let stats = store.stats()?;
    let health = OperationQueue::new(Arc::clone(&store)).health(now_millis())?;

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: stats.log_size,
        total_records: stats.total_records(),
        pending: health.pending,
        oldest_pending_ms: health.oldest_age.map(|age| age.as_millis() as u64),
        max_attempts: health.max_attempts,
        partitions: stats
            .partitions
            .into_iter()
            .map(|(name, records)| PartitionStats { name, records })
            .collect(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("hsesync Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:      {}", format_size(result.log_size));
    println!("  Total records: {}", result.total_records);
    println!();
    println!("Queue:");
    println!("  Pending:       {}", result.pending);
    if let Some(age) = result.oldest_pending_ms {
        println!("  Oldest:        {}", format_age(age));
    }
    println!("  Max attempts:  {}", result.max_attempts);
    println!();
    println!("Partitions:");
    for partition in &result.partitions {
        let marker = match partition.name.as_str() {
            PENDING_OPERATIONS | SYNC_ATTEMPTS => " (queue)",
            _ => "",
        };
        println!(
            "  {:<24} {:>6} records{}",
            partition.name, partition.records, marker
        );
    }
}
