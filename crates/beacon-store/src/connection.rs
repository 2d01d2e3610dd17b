//! The shared SQLite connection
//!
//! All pool workers go through one `Arc<Mutex<Connection>>`. Holding the lock
//! for a whole closure keeps `last_insert_rowid` tied to the insert that
//! produced it.

use crate::config::SqliteConfig;
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cloneable handle to the store's single connection
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePool {
    /// Open the database described by `config` and apply its pragmas
    pub fn new(config: SqliteConfig) -> StoreResult<Self> {
        info!(path = ?config.path, wal = config.wal_mode, "Opening store");

        let conn = if config.is_memory() {
            Connection::open_in_memory()
        } else {
            create_parent_dir(&config.path)?;
            Connection::open(&config.path)
        }
        .map_err(|e| StoreError::Connection(e.to_string()))?;

        apply_pragmas(&conn, &config).map_err(|e| {
            StoreError::Connection(format!("failed to configure {:?}: {}", config.path, e))
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh in-memory database
    pub fn memory() -> StoreResult<Self> {
        Self::new(SqliteConfig::memory())
    }

    /// Run `f` while holding the connection lock
    pub fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }
}

fn create_parent_dir(path: &Path) -> StoreResult<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Connection(format!("cannot create {}: {}", parent.display(), e))
        }),
        None => Ok(()),
    }
}

fn apply_pragmas(conn: &Connection, config: &SqliteConfig) -> rusqlite::Result<()> {
    // WAL has no meaning for an in-memory database
    if config.wal_mode && !config.is_memory() {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    }
    if config.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch(&format!("PRAGMA cache_size = {};", config.cache_size))?;
    if config.mmap_size > 0 {
        conn.execute_batch(&format!("PRAGMA mmap_size = {};", config.mmap_size))?;
    }
    conn.execute_batch("PRAGMA temp_store = MEMORY;")?;

    debug!(path = ?config.path, "Store pragmas applied");
    Ok(())
}
