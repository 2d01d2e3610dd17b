//! SQLite record store for Beacon
//!
//! This crate maps plain serde types onto SQLite tables. A type describes its
//! columns once through [`Record::descriptor`]; the store derives DDL, binds
//! insert/update parameters and decodes rows from that description.
//!
//! ## Features
//!
//! - **Lazy schemas**: tables are created on first write if they are missing
//! - **Name binding**: values are bound to columns by name, never by position
//! - **Bound parameters**: record values and filter values are never spliced into SQL text
//! - **Paging**: `query_page` reports total rows and pages alongside the rows
//! - **Thread Safety**: Arc<Mutex<Connection>> pattern for concurrent access
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_store::{Filter, RecordStore, SqliteConfig, SqlitePool};
//!
//! let pool = SqlitePool::new(SqliteConfig::new("./beacon.db"))?;
//! let store = RecordStore::new(pool);
//!
//! let mut reading = Reading { id: 0, mac: "AA:BB".into(), count: 5 };
//! store.insert("readings", &mut reading)?;
//!
//! let recent: Vec<Reading> = store.query_all(
//!     "readings",
//!     Some(&Filter::new("mac = ?").bind("AA:BB".to_string())),
//!     None,
//!     Some(10),
//! )?;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod schema;
pub mod store;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use descriptor::{Column, ColumnDefault, ColumnKind, Record, RecordDescriptor};
pub use error::{StoreError, StoreResult};
pub use filter::{Filter, Page, PageInfo, Sort, SortOrder};
pub use store::RecordStore;
