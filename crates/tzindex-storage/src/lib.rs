//! tzindex-storage — pluggable persistence backends for the index-state
//! store and contract registry.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, one-shot runs, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//! - [`postgres`] — PostgreSQL via `sqlx` (production, schema-isolated reindex)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryContractRegistry, MemoryIndexStateStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
