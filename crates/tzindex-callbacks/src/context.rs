//! The runtime context & control object passed to every handler and hook.

use std::collections::HashMap;
use std::sync::Arc;

use std::sync::Mutex;
use tokio::sync::{mpsc, RwLock};

use tzindex_core::config::Config;
use tzindex_core::error::{IndexerError, Result};
use tzindex_core::state_store::IndexStateRecord;
use tzindex_core::types::{Contract, IndexConfig, TemplateValues};
use tzindex_core::{CommitUnit, ContractRegistry, SqlCapable, TransactionalStore};
use tzindex_datasource::DatasourceClient;

use crate::manager::CallbackManager;

tokio::task_local! {
    /// The index currently being dispatched on this task, set for the
    /// duration of one [`Context::fire_handler`] call so [`Context::execute_sql`]
    /// can route to that index's open commit unit without an extra parameter.
    static CURRENT_INDEX: String;
}

/// What the engine should do after the current dispatch completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// Relaunch the process as-is.
    Restart,
    /// Relaunch after dropping (and, for immune tables, preserving) the
    /// user schema.
    Reindex { reason: Option<String> },
}

/// Shared runtime state visible to every handler/hook invocation.
pub struct Context {
    package: String,
    config: RwLock<Config>,
    datasources: HashMap<String, Arc<dyn DatasourceClient>>,
    contracts: Arc<dyn ContractRegistry>,
    sql: Option<Arc<dyn SqlCapable>>,
    sql_snippets: HashMap<String, String>,
    callbacks: Arc<CallbackManager>,
    control: Mutex<Option<ControlOutcome>>,
    spawn_tx: mpsc::UnboundedSender<String>,
    transactions: Option<Arc<dyn TransactionalStore>>,
    /// One open commit unit per index currently mid-dispatch. Removed from
    /// this map, operated on, then reinserted around every await so no
    /// non-`Send` mutex guard is ever held across an await point.
    open_units: Mutex<HashMap<String, Box<dyn CommitUnit>>>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        package: impl Into<String>,
        config: Config,
        datasources: HashMap<String, Arc<dyn DatasourceClient>>,
        contracts: Arc<dyn ContractRegistry>,
        sql: Option<Arc<dyn SqlCapable>>,
        sql_snippets: HashMap<String, String>,
        callbacks: Arc<CallbackManager>,
        transactions: Option<Arc<dyn TransactionalStore>>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        (
            Self {
                package: package.into(),
                config: RwLock::new(config),
                datasources,
                contracts,
                sql,
                sql_snippets,
                callbacks,
                control: Mutex::new(None),
                spawn_tx,
                transactions,
                open_units: Mutex::new(HashMap::new()),
            },
            spawn_rx,
        )
    }

    pub fn has_transactions(&self) -> bool {
        self.transactions.is_some()
    }

    /// Open a commit unit for `index_name`, replacing any unit already open
    /// for it. A no-op when this context has no transactional backend.
    pub async fn begin_commit_unit(&self, index_name: &str) -> Result<()> {
        let Some(backend) = &self.transactions else {
            return Ok(());
        };
        let unit = backend.begin().await?;
        self.open_units.lock().unwrap().insert(index_name.to_string(), unit);
        Ok(())
    }

    /// Commit and drop the open commit unit for `index_name`, if any.
    pub async fn commit_commit_unit(&self, index_name: &str) -> Result<()> {
        let unit = self.open_units.lock().unwrap().remove(index_name);
        if let Some(unit) = unit {
            unit.commit().await?;
        }
        Ok(())
    }

    /// Roll back and drop the open commit unit for `index_name`, if any.
    pub async fn rollback_commit_unit(&self, index_name: &str) -> Result<()> {
        let unit = self.open_units.lock().unwrap().remove(index_name);
        if let Some(unit) = unit {
            unit.rollback().await?;
        }
        Ok(())
    }

    /// Persist the cursor update for `index_name` through its open commit
    /// unit, if one exists. Callers without a transactional backend persist
    /// state through [`tzindex_core::state_store::IndexStateManager`] instead.
    pub async fn save_state_in_commit_unit(&self, index_name: &str, record: IndexStateRecord) -> Result<()> {
        let unit = self.open_units.lock().unwrap().remove(index_name);
        match unit {
            Some(mut unit) => {
                let result = unit.save_state(record).await;
                self.open_units.lock().unwrap().insert(index_name.to_string(), unit);
                result
            }
            None => Ok(()),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    pub fn datasource(&self, name: &str) -> Option<Arc<dyn DatasourceClient>> {
        self.datasources.get(name).cloned()
    }

    pub fn callbacks(&self) -> &Arc<CallbackManager> {
        &self.callbacks
    }

    /// Register a new contract at runtime. Fails if the name or address is
    /// already known.
    pub async fn add_contract(&self, name: &str, address: &str, typename: Option<String>) -> Result<()> {
        self.contracts
            .insert_contract(&Contract {
                name: name.to_string(),
                address: address.to_string(),
                typename,
            })
            .await
    }

    pub async fn contract(&self, name: &str) -> Result<Option<Contract>> {
        self.contracts.get_contract(name).await
    }

    /// Materialise a template into a concrete index, re-resolve the config
    /// against the known callback set, and notify the engine to spawn it.
    pub async fn add_index(&self, name: &str, template: &str, values: TemplateValues) -> Result<()> {
        let known_callbacks = self.callbacks.registered_handlers();
        let known: Vec<&str> = known_callbacks.iter().map(String::as_str).collect();

        {
            let mut config = self.config.write().await;
            if config.indexes.contains_key(name) {
                return Err(IndexerError::IndexAlreadyExists { name: name.to_string() });
            }
            config.indexes.insert(
                name.to_string(),
                IndexConfig::Template {
                    name: name.to_string(),
                    template: template.to_string(),
                    values,
                },
            );
            config.initialize(&known)?;
        }

        let _ = self.spawn_tx.send(name.to_string());
        Ok(())
    }

    /// Dispatch a handler callback, scoped to `index_name` so nested calls to
    /// [`Context::execute_sql`] route through that index's open commit unit.
    /// Dispatch for a given index is serialised — callers must not call this
    /// concurrently for the same `index_name` — but calls for different
    /// indexes may interleave freely.
    pub async fn fire_handler(
        self: &Arc<Self>,
        index_name: &str,
        name: &str,
        payload: crate::payload::HandlerPayload,
    ) -> Result<()> {
        let ctx = Arc::clone(self);
        CURRENT_INDEX
            .scope(index_name.to_string(), async move { ctx.callbacks.fire_handler(ctx.clone(), name, payload).await })
            .await
    }

    pub async fn fire_hook(self: &Arc<Self>, name: &str, args: Vec<serde_json::Value>) -> Result<()> {
        self.callbacks.fire_hook(Arc::clone(self), name, args).await
    }

    /// Run a named, pre-declared SQL snippet. Within a handler dispatched via
    /// [`Context::fire_handler`], this routes through that index's open
    /// commit unit when a transactional backend is configured; otherwise
    /// it is a no-op with a warning on backends that cannot execute
    /// arbitrary SQL (SQLite, memory).
    pub async fn execute_sql(&self, name: &str) -> Result<()> {
        let Some(sql) = self.sql_snippets.get(name) else {
            return Err(IndexerError::Configuration(format!("no SQL snippet named '{name}'")));
        };

        if let Ok(index_name) = CURRENT_INDEX.try_with(|name| name.clone()) {
            let unit = self.open_units.lock().unwrap().remove(&index_name);
            if let Some(mut unit) = unit {
                let result = unit.execute_sql(sql).await;
                self.open_units.lock().unwrap().insert(index_name, unit);
                return result;
            }
        }

        match &self.sql {
            Some(backend) => backend.execute_sql(sql).await,
            None => {
                tracing::warn!(snippet = %name, "execute_sql is a no-op on this storage backend");
                Ok(())
            }
        }
    }

    /// Signal that the process should reindex. The caller's engine loop is
    /// responsible for observing this via [`Context::take_control`] and
    /// acting on it after the current dispatch unwinds.
    pub fn reindex(&self, reason: Option<String>) -> ControlOutcome {
        let outcome = ControlOutcome::Reindex { reason };
        *self.control.lock().unwrap() = Some(outcome.clone());
        outcome
    }

    pub fn restart(&self) -> ControlOutcome {
        let outcome = ControlOutcome::Restart;
        *self.control.lock().unwrap() = Some(outcome.clone());
        outcome
    }

    pub fn take_control(&self) -> Option<ControlOutcome> {
        self.control.lock().unwrap().take()
    }
}
