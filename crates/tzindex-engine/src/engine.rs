//! The per-index engine loop — orchestrates backfill and live phases for one
//! configured operation index.
//!
//! # Phase 1: BACKFILL
//! Fetch operations from the persisted cursor up to `head - confirmation_depth`
//! in batches. For each batch: feed the matcher, dispatch matched handlers,
//! commit the cursor, persist index state.
//!
//! # Phase 2: LIVE
//! Consume the datasource's buffered live stream. On each flushed level:
//! match, dispatch, commit. On a rollback notification: reverse the cursor
//! and replay forward via the same backfill path.

use std::sync::Arc;

use tracing::info;

use tzindex_callbacks::{Context, ControlOutcome, HandlerPayload};
use tzindex_core::error::{IndexerError, Result};
use tzindex_core::matcher::{Match, OperationCache};
use tzindex_core::state::{IndexRuntimeConfig, IndexState};
use tzindex_core::state_store::{IndexStateManager, IndexStateRecord};
use tzindex_core::types::HandlerConfig;
use tzindex_datasource::{DatasourceClient, FlushedEvent};

/// What the caller (the `cli` crate's supervisor) should do once an engine's
/// `run` call returns.
#[derive(Debug)]
pub enum EngineOutcome {
    /// The index reached a bound (`last_level`) or the live stream closed.
    Stopped,
    /// A callback requested a restart or reindex.
    Control(ControlOutcome),
}

/// Drives one operation index through backfill and live phases.
pub struct IndexEngine {
    config: IndexRuntimeConfig,
    contracts: Vec<String>,
    datasource: Arc<dyn DatasourceClient>,
    cache: OperationCache,
    state: IndexState,
    state_store: IndexStateManager,
    ctx: Arc<Context>,
    batch_size: u64,
}

impl IndexEngine {
    pub fn new(
        config: IndexRuntimeConfig,
        contracts: Vec<String>,
        datasource: Arc<dyn DatasourceClient>,
        handlers: Vec<HandlerConfig>,
        state_store: IndexStateManager,
        ctx: Arc<Context>,
        batch_size: u64,
    ) -> Self {
        let mut cache = OperationCache::new();
        cache.add_index(config.name.clone(), handlers);
        let state = IndexState::new(config.clone());
        Self {
            config,
            contracts,
            datasource,
            cache,
            state,
            state_store,
            ctx,
            batch_size,
        }
    }

    pub async fn run(&mut self) -> Result<EngineOutcome> {
        if let Some(record) = self.state_store.load().await? {
            self.state.cursor.reset(record.level);
            info!(index = %self.config.name, level = record.level, "resuming from persisted state");
        }
        self.state.mark_initialised();

        if let Some(outcome) = self.backfill().await? {
            return Ok(outcome);
        }
        if !self.state.is_active() {
            return Ok(EngineOutcome::Stopped);
        }

        self.live().await
    }

    /// Catch up from the current cursor to `head - confirmation_depth` (or
    /// `last_level`, whichever is lower). Returns `Some(outcome)` if a
    /// callback requested control mid-backfill.
    async fn backfill(&mut self) -> Result<Option<EngineOutcome>> {
        let head = self
            .datasource
            .current_head_level()
            .await
            .map_err(|e| IndexerError::Datasource(e.to_string()))?;

        loop {
            let confirmed = head.saturating_sub(self.config.confirmation_depth);
            let target = match self.config.last_level {
                Some(bound) => bound.min(confirmed),
                None => confirmed,
            };
            if self.state.cursor.level >= target {
                break;
            }

            let from = self.state.cursor.level + 1;
            let to = (from + self.batch_size - 1).min(target);

            let operations = self
                .datasource
                .fetch_operations(from, to)
                .await
                .map_err(|e| IndexerError::Datasource(e.to_string()))?;
            let count = operations.len();
            for op in operations {
                self.cache.add(op);
            }

            if let Some(outcome) = self.run_commit_unit(to, head).await? {
                return Ok(Some(outcome));
            }
            info!(index = %self.config.name, from, to, operations = count, "backfill batch committed");

            if !self.state.is_active() {
                break;
            }
        }

        Ok(None)
    }

    async fn live(&mut self) -> Result<EngineOutcome> {
        let mut rx = self.datasource.subscribe(self.contracts.clone(), vec![]);

        while let Some(event) = rx.recv().await {
            match event {
                FlushedEvent::Level { level, operations, .. } => {
                    for op in operations {
                        self.cache.add(op);
                    }
                    if let Some(outcome) = self.run_commit_unit(level, level).await? {
                        return Ok(outcome);
                    }
                    if !self.state.is_active() {
                        return Ok(EngineOutcome::Stopped);
                    }
                }
                FlushedEvent::Rollback { level } => {
                    info!(index = %self.config.name, level, "rollback notification received");
                    self.state.begin_rollback(level);
                    self.state_store.force_save(level, self.state.status, None).await?;

                    if let Some(outcome) = self.backfill().await? {
                        return Ok(outcome);
                    }
                    self.state.finish_rollback();
                }
            }
        }

        Ok(EngineOutcome::Stopped)
    }

    /// Process every completed group buffered in the cache, dispatch its
    /// matches, and commit the cursor up to `to` — all as one commit unit.
    /// On a transactional backend, every handler mutation plus the cursor
    /// update lives in one open transaction that commits at the end of this
    /// call or aborts entirely if a handler errors or requests control.
    async fn run_commit_unit(&mut self, to: u64, head: u64) -> Result<Option<EngineOutcome>> {
        let transactional = self.ctx.has_transactions();
        if transactional {
            self.ctx.begin_commit_unit(&self.config.name).await?;
        }

        let matches: Vec<Match> = self.cache.process();
        for matched in matches {
            let dispatched = self
                .ctx
                .fire_handler(
                    &self.config.name,
                    &matched.handler.callback,
                    HandlerPayload::Operations(matched.matched_operations),
                )
                .await;

            if let Err(err) = dispatched {
                if transactional {
                    self.ctx.rollback_commit_unit(&self.config.name).await?;
                }
                return Err(err);
            }

            if let Some(control) = self.ctx.take_control() {
                if transactional {
                    self.ctx.rollback_commit_unit(&self.config.name).await?;
                }
                return Ok(Some(EngineOutcome::Control(control)));
            }
        }

        self.state.commit_level(to, head);

        if transactional {
            self.ctx
                .save_state_in_commit_unit(
                    &self.config.name,
                    IndexStateRecord {
                        dapp: self.config.name.clone(),
                        level: to,
                        status: self.state.status,
                        hash: None,
                    },
                )
                .await?;
            self.ctx.commit_commit_unit(&self.config.name).await?;
        } else {
            self.state_store.force_save(to, self.state.status, None).await?;
        }

        Ok(None)
    }
}
