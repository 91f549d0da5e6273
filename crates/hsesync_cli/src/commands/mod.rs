//! CLI command implementations.

pub mod cache;
pub mod compact;
pub mod inspect;
pub mod pending;
pub mod verify;

use hsesync_engine::store_config;
use hsesync_store::LocalStore;
use std::path::Path;
use std::sync::Arc;

/// Opens an existing store; maintenance never creates one.
pub fn open_existing(path: &Path) -> Result<Arc<LocalStore>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    tracing::debug!(path = %path.display(), "opening store");
    let store = LocalStore::open(path, store_config().create_if_missing(false))?;
    tracing::debug!(stats = ?store.stats()?, "store opened");
    Ok(Arc::new(store))
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Human-readable age, e.g. `3m 12s`.
pub fn format_age(millis: u64) -> String {
    let secs = millis / 1000;
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        3600..=86_399 => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
        _ => format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600),
    }
}
