//! Persisted index-state store — the abstraction the `dipdup_state` table
//! sits behind. Concrete SQLite/Postgres implementations live in
//! `tzindex-storage`; this crate only defines the trait, the record shape,
//! and an in-memory implementation for tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::IndexStatus;

/// A single row of the `dipdup_state` table: one per configured index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStateRecord {
    /// Primary key — the index name.
    pub dapp: String,
    pub level: u64,
    pub status: IndexStatus,
    /// Schema hash at the time this row was last written, used to detect
    /// drift between runs.
    pub hash: Option<String>,
}

/// Storage backend for index-state rows.
#[async_trait]
pub trait IndexStateStore: Send + Sync {
    async fn load(&self, dapp: &str) -> Result<Option<IndexStateRecord>>;
    async fn save(&self, record: IndexStateRecord) -> Result<()>;
    async fn delete(&self, dapp: &str) -> Result<()>;
}

/// Coordinates reads/writes against an [`IndexStateStore`] for one index.
/// Every committed level is persisted immediately — there is no batching,
/// so a crash never loses more than the level currently in flight.
pub struct IndexStateManager {
    store: Box<dyn IndexStateStore>,
    dapp: String,
}

impl IndexStateManager {
    pub fn new(store: Box<dyn IndexStateStore>, dapp: impl Into<String>) -> Self {
        Self {
            store,
            dapp: dapp.into(),
        }
    }

    pub async fn load(&self) -> Result<Option<IndexStateRecord>> {
        self.store.load(&self.dapp).await
    }

    /// Persist state — called once per committed level, and on rollback and
    /// reindex.
    pub async fn force_save(&self, level: u64, status: IndexStatus, hash: Option<String>) -> Result<()> {
        self.store
            .save(IndexStateRecord {
                dapp: self.dapp.clone(),
                level,
                status,
                hash,
            })
            .await
    }
}

// ─── In-memory store (tests, ephemeral / oneshot runs) ────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryIndexStateStore {
    data: Mutex<HashMap<String, IndexStateRecord>>,
}

impl MemoryIndexStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStateStore for MemoryIndexStateStore {
    async fn load(&self, dapp: &str) -> Result<Option<IndexStateRecord>> {
        Ok(self.data.lock().unwrap().get(dapp).cloned())
    }

    async fn save(&self, record: IndexStateRecord) -> Result<()> {
        self.data.lock().unwrap().insert(record.dapp.clone(), record);
        Ok(())
    }

    async fn delete(&self, dapp: &str) -> Result<()> {
        self.data.lock().unwrap().remove(dapp);
        Ok(())
    }
}

/// Lets a shared, already-open storage backend (behind an `Arc`) be handed
/// to more than one [`IndexStateManager`] — one per index — without any of
/// them owning the connection pool.
#[async_trait]
impl IndexStateStore for Arc<dyn IndexStateStore> {
    async fn load(&self, dapp: &str) -> Result<Option<IndexStateRecord>> {
        (**self).load(dapp).await
    }

    async fn save(&self, record: IndexStateRecord) -> Result<()> {
        (**self).save(record).await
    }

    async fn delete(&self, dapp: &str) -> Result<()> {
        (**self).delete(dapp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Box::new(MemoryIndexStateStore::new());
        let mgr = IndexStateManager::new(store, "hic_et_nunc");

        assert!(mgr.load().await.unwrap().is_none());

        mgr.force_save(1000, IndexStatus::Realtime, Some("abc123".into()))
            .await
            .unwrap();

        let record = mgr.load().await.unwrap().unwrap();
        assert_eq!(record.level, 1000);
        assert_eq!(record.status, IndexStatus::Realtime);
        assert_eq!(record.dapp, "hic_et_nunc");
    }

    #[tokio::test]
    async fn every_committed_level_is_persisted_immediately() {
        let store = Box::new(MemoryIndexStateStore::new());
        let mgr = IndexStateManager::new(store, "idx");

        for level in 1..=4 {
            mgr.force_save(level, IndexStatus::Syncing, None).await.unwrap();
            let record = mgr.load().await.unwrap().unwrap();
            assert_eq!(record.level, level);
        }
    }

    #[tokio::test]
    async fn shared_store_is_usable_by_more_than_one_manager() {
        let shared: Arc<dyn IndexStateStore> = Arc::new(MemoryIndexStateStore::new());
        let mgr_a = IndexStateManager::new(Box::new(shared.clone()), "idx_a");
        let mgr_b = IndexStateManager::new(Box::new(shared.clone()), "idx_b");

        mgr_a.force_save(100, IndexStatus::Realtime, None).await.unwrap();
        mgr_b.force_save(200, IndexStatus::Realtime, None).await.unwrap();

        assert_eq!(mgr_a.load().await.unwrap().unwrap().level, 100);
        assert_eq!(mgr_b.load().await.unwrap().unwrap().level, 200);
    }
}
