//! Capability traits a storage backend may implement, used by the context
//! object to reach storage without the core crate depending on any concrete
//! backend. `tzindex-storage`'s SQLite/Postgres/memory backends implement
//! these directly; each backend still exposes its own inherent methods too.

use async_trait::async_trait;

use crate::error::Result;
use crate::state_store::IndexStateRecord;
use crate::types::Contract;

/// Backend-agnostic contract registry access (the `dipdup_contract` table,
/// or an in-memory equivalent).
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    async fn insert_contract(&self, contract: &Contract) -> Result<()>;
    async fn get_contract(&self, name: &str) -> Result<Option<Contract>>;
    async fn list_contracts(&self) -> Result<Vec<Contract>>;
}

/// Backends that can run arbitrary user SQL (Postgres). SQLite and the
/// in-memory backend do not implement this; callers should treat its
/// absence as a no-op-with-warning, not an error.
#[async_trait]
pub trait SqlCapable: Send + Sync {
    async fn execute_sql(&self, sql: &str) -> Result<()>;
}

/// Backends that can open a connection-bound commit unit. The context object
/// uses this to thread one open transaction per in-flight index through
/// every handler it dispatches for a given level, so a level's callback
/// mutations and its cursor update commit or abort together.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CommitUnit>>;
}

/// One open transaction, bound to a single connection checked out of the
/// backend's pool. Dropped without a `commit`/`rollback` call, the
/// underlying connection's own `Drop` rolls it back.
#[async_trait]
pub trait CommitUnit: Send + Sync {
    async fn execute_sql(&mut self, sql: &str) -> Result<()>;
    async fn save_state(&mut self, record: IndexStateRecord) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Backends that can drive their own reindex sequence without the caller
/// supplying backend-specific arguments (immune-table lists, user-table
/// lists) at the call site — those are fixed at construction time instead.
#[async_trait]
pub trait ReindexCapable: Send + Sync {
    async fn reindex(&self) -> Result<()>;
}
