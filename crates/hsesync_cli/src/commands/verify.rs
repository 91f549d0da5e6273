//! Verify command implementation.

use super::format_size;
use hsesync_store::{verify, StoreError, VerifyReport};
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {:?}", path);
    println!();

    let report = match verify(path) {
        Ok(report) => report,
        Err(e @ (StoreError::Corrupted { .. } | StoreError::ChecksumMismatch { .. })) => {
            println!("  ERROR: {}", e);
            println!();
            println!("✗ Store verification failed");
            return Err("Verification failed".into());
        }
        Err(e) => return Err(e.into()),
    };

    print_report(&report);

    println!();
    if report.is_clean() {
        println!("✓ Store verification passed");
    } else {
        println!("✓ Store verification passed; the next open will discard the tail above");
    }
    Ok(())
}

fn print_report(report: &VerifyReport) {
    println!(
        "  Records checked: {}, committed transactions: {}",
        report.records, report.committed
    );
    println!(
        "  Valid bytes: {} of {}",
        format_size(report.valid_bytes),
        format_size(report.total_bytes)
    );
    for (partition, writes) in &report.writes_per_partition {
        println!("    {:<24} {:>6} writes", partition, writes);
    }
    if report.incomplete > 0 {
        println!(
            "  WARNING: {} transaction(s) without a commit",
            report.incomplete
        );
    }
    if report.torn_bytes() > 0 {
        println!("  WARNING: {} byte torn write at the end", report.torn_bytes());
    }
}
