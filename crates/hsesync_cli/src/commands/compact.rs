//! Compact command implementation.

use super::{format_size, open_existing};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;

    println!("Compacting store at {:?}", path);
    println!();

    let stats = store.compact()?;
    store.close()?;

    println!("Compaction:");
    println!("  Live records: {}", stats.records);
    println!("  Size before:  {}", format_size(stats.before));
    println!("  Size after:   {}", format_size(stats.after));
    println!(
        "  Space saved:  {} ({:.1}%)",
        format_size(stats.before.saturating_sub(stats.after)),
        if stats.before > 0 {
            (stats.before.saturating_sub(stats.after) as f64 / stats.before as f64) * 100.0
        } else {
            0.0
        }
    );
    println!();
    println!("✓ Compaction complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seeded_store;
    use crate::commands::{inspect, pending};

    #[test]
    fn compaction_keeps_contents() {
        let (_dir, path) = seeded_store();
        let before = inspect::inspect(&path).unwrap();
        let queued = pending::list(&path, None).unwrap();

        run(&path).unwrap();

        let after = inspect::inspect(&path).unwrap();
        assert_eq!(after.total_records, before.total_records);
        let requeued = pending::list(&path, None).unwrap();
        assert_eq!(
            requeued.iter().map(|o| &o.id).collect::<Vec<_>>(),
            queued.iter().map(|o| &o.id).collect::<Vec<_>>()
        );
        assert_eq!(requeued[0].attempts, 2);
    }
}
