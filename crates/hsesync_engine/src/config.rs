//! Configuration for the sync engine.

use std::time::Duration;

/// Default time between timer-driven flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default field that carries the organization on replayed writes.
pub const DEFAULT_ORGANIZATION_FIELD: &str = "organization_id";

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between timer-driven flushes while the engine runs.
    pub flush_interval: Duration,
    /// Flush once as soon as the engine starts.
    pub flush_on_start: bool,
    /// Flush when connectivity comes back.
    pub flush_on_reconnect: bool,
    /// Flush right after a local write when online.
    pub flush_after_write: bool,
    /// Field added to inserts and updates with the resolved organization id.
    pub organization_field: String,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_on_start: true,
            flush_on_reconnect: true,
            flush_after_write: true,
            organization_field: DEFAULT_ORGANIZATION_FIELD.to_string(),
        }
    }

    /// Sets the flush interval. Must be non-zero for
    /// [`SyncEngine::start`](crate::SyncEngine::start) to accept it.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets whether to flush on start.
    pub fn with_flush_on_start(mut self, enabled: bool) -> Self {
        self.flush_on_start = enabled;
        self
    }

    /// Sets whether to flush when connectivity returns.
    pub fn with_flush_on_reconnect(mut self, enabled: bool) -> Self {
        self.flush_on_reconnect = enabled;
        self
    }

    /// Sets whether local writes trigger an immediate flush.
    pub fn with_flush_after_write(mut self, enabled: bool) -> Self {
        self.flush_after_write = enabled;
        self
    }

    /// Sets the organization field name.
    pub fn with_organization_field(mut self, field: impl Into<String>) -> Self {
        self.organization_field = field.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
