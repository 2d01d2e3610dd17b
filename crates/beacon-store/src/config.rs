//! SQLite connection configuration

use std::path::{Path, PathBuf};

/// Settings applied when the connection is opened.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    /// Enable write-ahead logging
    pub wal_mode: bool,
    /// Enforce foreign key constraints
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database
    pub busy_timeout_ms: u64,
    /// `PRAGMA cache_size` value (negative means KiB)
    pub cache_size: i64,
    /// `PRAGMA mmap_size` in bytes, 0 disables
    pub mmap_size: u64,
}

impl SqliteConfig {
    /// Configuration for a database file at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// In-memory database, mostly for tests
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            wal_mode: false,
            ..Self::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(":memory:")
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./beacon.db"),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
            cache_size: -16_000,
            mmap_size: 0,
        }
    }
}
