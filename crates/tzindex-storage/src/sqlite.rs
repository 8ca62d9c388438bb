//! SQLite storage backend.
//!
//! Persists index state (`dipdup_state`) and the contract registry
//! (`dipdup_contract`) to a single SQLite file. Uses `sqlx` with WAL mode for
//! concurrent read throughput. SQLite has no schema isolation, so reindexing
//! on this backend means dropping every table and recreating them (see
//! [`SqliteStorage::reindex`]).
//!
//! # Usage
//! ```rust,no_run
//! use tzindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStorage::open("./index.db").await?;
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use tzindex_core::error::{IndexerError, Result};
use tzindex_core::state::IndexStatus;
use tzindex_core::state_store::{IndexStateRecord, IndexStateStore};
use tzindex_core::types::Contract;
use tzindex_core::{CommitUnit, ReindexCapable, TransactionalStore};

/// SQLite-backed storage for index state and the contract registry.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./index.db"`) or a full
    /// SQLite URL (`"sqlite:./index.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self> {
        tzindex_core::validate::validate_framework_schema().map_err(IndexerError::Configuration)?;

        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database. Ideal for tests.
    pub async fn in_memory() -> Result<Self> {
        tzindex_core::validate::validate_framework_schema().map_err(IndexerError::Configuration)?;

        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        for ddl in Self::ddl_statements() {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    fn ddl_statements() -> [&'static str; 2] {
        [
            "CREATE TABLE IF NOT EXISTS dipdup_state (
                dapp   TEXT    PRIMARY KEY,
                level  INTEGER NOT NULL,
                status INTEGER NOT NULL,
                hash   TEXT
            );",
            "CREATE TABLE IF NOT EXISTS dipdup_contract (
                name     TEXT PRIMARY KEY,
                address  TEXT NOT NULL UNIQUE,
                typename TEXT
            );",
        ]
    }

    /// The schema hash of the framework's own tables, for comparison against
    /// a persisted hash from a previous run. Callers append their generated
    /// model DDL to this before calling [`tzindex_core::schema_hash`].
    pub fn framework_ddl() -> Vec<&'static str> {
        Self::ddl_statements().to_vec()
    }

    // ─── Contract registry ──────────────────────────────────────────────

    pub async fn insert_contract(&self, contract: &Contract) -> Result<()> {
        let existing = sqlx::query("SELECT name FROM dipdup_contract WHERE name = ? OR address = ?")
            .bind(&contract.name)
            .bind(&contract.address)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        if existing.is_some() {
            return Err(IndexerError::ContractAlreadyExists {
                name: contract.name.clone(),
                address: contract.address.clone(),
            });
        }

        sqlx::query("INSERT INTO dipdup_contract (name, address, typename) VALUES (?, ?, ?)")
            .bind(&contract.name)
            .bind(&contract.address)
            .bind(&contract.typename)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    pub async fn get_contract(&self, name: &str) -> Result<Option<Contract>> {
        let row = sqlx::query("SELECT name, address, typename FROM dipdup_contract WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| Contract {
            name: r.get("name"),
            address: r.get("address"),
            typename: r.get("typename"),
        }))
    }

    pub async fn list_contracts(&self) -> Result<Vec<Contract>> {
        let rows = sqlx::query("SELECT name, address, typename FROM dipdup_contract ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| Contract {
                name: r.get("name"),
                address: r.get("address"),
                typename: r.get("typename"),
            })
            .collect())
    }

    // ─── Reindex ────────────────────────────────────────────────────────

    /// SQLite has no schema namespacing, so a reindex drops every table the
    /// indexer knows about (the framework's own plus `user_tables`) and
    /// recreates the framework tables. Immune tables are not supported on
    /// this backend; callers should reject a config declaring any for a
    /// SQLite database at startup.
    pub async fn reindex_with_tables(&self, user_tables: &[&str]) -> Result<()> {
        for table in user_tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }
        sqlx::query("DROP TABLE IF EXISTS dipdup_state")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        sqlx::query("DROP TABLE IF EXISTS dipdup_contract")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        self.init_schema().await
    }
}

// ─── IndexStateStore impl ───────────────────────────────────────────────

#[async_trait]
impl IndexStateStore for SqliteStorage {
    async fn load(&self, dapp: &str) -> Result<Option<IndexStateRecord>> {
        let row = sqlx::query("SELECT dapp, level, status, hash FROM dipdup_state WHERE dapp = ?")
            .bind(dapp)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| -> Result<IndexStateRecord> {
            Ok(IndexStateRecord {
                dapp: r.get("dapp"),
                level: r.get::<i64, _>("level") as u64,
                status: status_from_i64(r.get("status"))?,
                hash: r.get("hash"),
            })
        })
        .transpose()
    }

    async fn save(&self, record: IndexStateRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO dipdup_state (dapp, level, status, hash) VALUES (?, ?, ?, ?)
             ON CONFLICT(dapp) DO UPDATE SET level = excluded.level, status = excluded.status, hash = excluded.hash",
        )
        .bind(&record.dapp)
        .bind(record.level as i64)
        .bind(status_to_i64(record.status))
        .bind(&record.hash)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(dapp = %record.dapp, level = record.level, "index state saved");
        Ok(())
    }

    async fn delete(&self, dapp: &str) -> Result<()> {
        sqlx::query("DELETE FROM dipdup_state WHERE dapp = ?")
            .bind(dapp)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl tzindex_core::ContractRegistry for SqliteStorage {
    async fn insert_contract(&self, contract: &Contract) -> Result<()> {
        SqliteStorage::insert_contract(self, contract).await
    }

    async fn get_contract(&self, name: &str) -> Result<Option<Contract>> {
        SqliteStorage::get_contract(self, name).await
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>> {
        SqliteStorage::list_contracts(self).await
    }
}

#[async_trait]
impl ReindexCapable for SqliteStorage {
    /// SQLite has no generic "user tables" registry to draw from, so a
    /// zero-argument reindex only drops and recreates the framework tables.
    async fn reindex(&self) -> Result<()> {
        self.reindex_with_tables(&[]).await
    }
}

#[async_trait]
impl TransactionalStore for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn CommitUnit>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(format!("sqlite begin: {e}")))?;
        Ok(Box::new(SqliteCommitUnit { tx: Some(tx) }))
    }
}

/// One open SQLite transaction bound to a connection checked out of the pool.
pub struct SqliteCommitUnit {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteCommitUnit {
    fn tx_mut(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| IndexerError::Storage("commit unit already finalized".into()))
    }
}

#[async_trait]
impl CommitUnit for SqliteCommitUnit {
    async fn execute_sql(&mut self, sql: &str) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(sql)
            .execute(&mut **tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn save_state(&mut self, record: IndexStateRecord) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(
            "INSERT INTO dipdup_state (dapp, level, status, hash) VALUES (?, ?, ?, ?)
             ON CONFLICT(dapp) DO UPDATE SET level = excluded.level, status = excluded.status, hash = excluded.hash",
        )
        .bind(&record.dapp)
        .bind(record.level as i64)
        .bind(status_to_i64(record.status))
        .bind(&record.hash)
        .execute(&mut **tx)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| IndexerError::Storage("commit unit already finalized".into()))?;
        tx.commit().await.map_err(|e| IndexerError::Storage(e.to_string()))
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| IndexerError::Storage("commit unit already finalized".into()))?;
        tx.rollback().await.map_err(|e| IndexerError::Storage(e.to_string()))
    }
}

fn status_to_i64(status: IndexStatus) -> i64 {
    match status {
        IndexStatus::New => 0,
        IndexStatus::Syncing => 1,
        IndexStatus::Realtime => 2,
        IndexStatus::Rollback => 3,
        IndexStatus::Disabled => 4,
    }
}

fn status_from_i64(value: i64) -> Result<IndexStatus> {
    Ok(match value {
        0 => IndexStatus::New,
        1 => IndexStatus::Syncing,
        2 => IndexStatus::Realtime,
        3 => IndexStatus::Rollback,
        4 => IndexStatus::Disabled,
        other => return Err(IndexerError::Storage(format!("unknown index status code {other}"))),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dapp: &str, level: u64, status: IndexStatus) -> IndexStateRecord {
        IndexStateRecord {
            dapp: dapp.to_string(),
            level,
            status,
            hash: Some("abc123".into()),
        }
    }

    #[tokio::test]
    async fn state_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save(record("hic_et_nunc", 1_000, IndexStatus::Realtime)).await.unwrap();

        let loaded = store.load("hic_et_nunc").await.unwrap().unwrap();
        assert_eq!(loaded.level, 1_000);
        assert_eq!(loaded.status, IndexStatus::Realtime);
        assert_eq!(loaded.hash.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn state_upsert_overwrites() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save(record("idx", 100, IndexStatus::Syncing)).await.unwrap();
        store.save(record("idx", 200, IndexStatus::Realtime)).await.unwrap();

        let loaded = store.load("idx").await.unwrap().unwrap();
        assert_eq!(loaded.level, 200);
        assert_eq!(loaded.status, IndexStatus::Realtime);
    }

    #[tokio::test]
    async fn state_missing_returns_none() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.load("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn state_delete() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save(record("idx", 500, IndexStatus::Syncing)).await.unwrap();
        store.delete("idx").await.unwrap();
        assert!(store.load("idx").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn contract_insert_and_lookup() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let c = Contract {
            name: "tzcolors".into(),
            address: "KT1abc".into(),
            typename: Some("TzColors".into()),
        };
        store.insert_contract(&c).await.unwrap();

        let loaded = store.get_contract("tzcolors").await.unwrap().unwrap();
        assert_eq!(loaded.address, "KT1abc");
    }

    #[tokio::test]
    async fn contract_duplicate_name_rejected() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let c1 = Contract { name: "tzcolors".into(), address: "KT1abc".into(), typename: None };
        let c2 = Contract { name: "tzcolors".into(), address: "KT1def".into(), typename: None };
        store.insert_contract(&c1).await.unwrap();
        let err = store.insert_contract(&c2).await.unwrap_err();
        assert!(matches!(err, IndexerError::ContractAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn contract_duplicate_address_rejected() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let c1 = Contract { name: "a".into(), address: "KT1abc".into(), typename: None };
        let c2 = Contract { name: "b".into(), address: "KT1abc".into(), typename: None };
        store.insert_contract(&c1).await.unwrap();
        let err = store.insert_contract(&c2).await.unwrap_err();
        assert!(matches!(err, IndexerError::ContractAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn reindex_drops_user_and_framework_tables() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save(record("idx", 100, IndexStatus::Syncing)).await.unwrap();
        sqlx::query("CREATE TABLE holders (address TEXT PRIMARY KEY, balance TEXT NOT NULL)")
            .execute(&store.pool)
            .await
            .unwrap();

        store.reindex_with_tables(&["holders"]).await.unwrap();

        assert!(store.load("idx").await.unwrap().is_none());
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='holders'")
            .fetch_optional(&store.pool)
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn committed_unit_persists_state_and_rolled_back_unit_does_not() {
        let store = SqliteStorage::in_memory().await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.save_state(record("idx", 100, IndexStatus::Syncing)).await.unwrap();
        unit.commit().await.unwrap();
        assert_eq!(store.load("idx").await.unwrap().unwrap().level, 100);

        let mut unit = store.begin().await.unwrap();
        unit.save_state(record("idx", 200, IndexStatus::Syncing)).await.unwrap();
        unit.rollback().await.unwrap();
        assert_eq!(store.load("idx").await.unwrap().unwrap().level, 100);
    }
}
