//! Store configuration.

/// Log size above which a commit triggers automatic compaction (8 MiB).
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Configuration for opening a [`crate::LocalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Create the store directory when it does not exist.
    pub create_if_missing: bool,

    /// Flush the log after every committed transaction.
    pub sync_on_commit: bool,

    /// Compact the log once it grows past this many bytes (0 = never).
    pub compact_threshold: u64,

    /// Partitions that always exist after open.
    pub partitions: Vec<String>,

    /// The field each record is keyed by.
    pub key_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            partitions: Vec::new(),
            key_field: "id".to_string(),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values and no partitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the partitions the store must provide.
    #[must_use]
    pub fn partitions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partitions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether to create a missing store directory.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the automatic compaction threshold in bytes.
    #[must_use]
    pub const fn compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold = bytes;
        self
    }

    /// Sets the record key field.
    #[must_use]
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }
}
