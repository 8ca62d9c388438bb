//! The per-index engine loop for a big-map index — mirrors [`crate::engine::IndexEngine`]
//! but fetches and matches big-map diffs directly instead of buffering
//! operation groups.

use std::sync::Arc;

use tracing::info;

use tzindex_callbacks::{Context, ControlOutcome, HandlerPayload};
use tzindex_core::error::{IndexerError, Result};
use tzindex_core::matcher::{BigMapMatch, BigMapMatcher};
use tzindex_core::state::{IndexRuntimeConfig, IndexState};
use tzindex_core::state_store::{IndexStateManager, IndexStateRecord};
use tzindex_core::types::BigMapHandlerConfig;
use tzindex_datasource::{DatasourceClient, FlushedEvent};

use crate::engine::EngineOutcome;

/// Drives one big-map index through backfill and live phases.
pub struct BigMapIndexEngine {
    config: IndexRuntimeConfig,
    datasource: Arc<dyn DatasourceClient>,
    contracts: Vec<String>,
    paths: Vec<String>,
    matcher: BigMapMatcher,
    state: IndexState,
    state_store: IndexStateManager,
    ctx: Arc<Context>,
    batch_size: u64,
}

impl BigMapIndexEngine {
    pub fn new(
        config: IndexRuntimeConfig,
        datasource: Arc<dyn DatasourceClient>,
        handlers: Vec<BigMapHandlerConfig>,
        state_store: IndexStateManager,
        ctx: Arc<Context>,
        batch_size: u64,
    ) -> Self {
        let contracts = handlers.iter().map(|h| h.contract.clone()).collect();
        let paths = handlers.iter().map(|h| h.path.clone()).collect();
        let mut matcher = BigMapMatcher::new();
        matcher.add_index(config.name.clone(), handlers);
        let state = IndexState::new(config.clone());
        Self {
            config,
            datasource,
            contracts,
            paths,
            matcher,
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

            let diffs = self
                .datasource
                .fetch_bigmaps(from, to)
                .await
                .map_err(|e| IndexerError::Datasource(e.to_string()))?;
            let count = diffs.len();

            if let Some(outcome) = self.run_commit_unit(&diffs, to, head).await? {
                return Ok(Some(outcome));
            }
            info!(index = %self.config.name, from, to, diffs = count, "backfill batch committed");

            if !self.state.is_active() {
                break;
            }
        }

        Ok(None)
    }

    async fn live(&mut self) -> Result<EngineOutcome> {
        let mut rx = self.datasource.subscribe(self.contracts.clone(), self.paths.clone());

        while let Some(event) = rx.recv().await {
            match event {
                FlushedEvent::Level { level, bigmaps, .. } => {
                    if let Some(outcome) = self.run_commit_unit(&bigmaps, level, level).await? {
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

    /// Match and dispatch every diff directly (no grouping/buffering), then
    /// commit the cursor up to `to` — all as one commit unit.
    async fn run_commit_unit(
        &mut self,
        diffs: &[tzindex_core::types::BigMapDiff],
        to: u64,
        head: u64,
    ) -> Result<Option<EngineOutcome>> {
        let transactional = self.ctx.has_transactions();
        if transactional {
            self.ctx.begin_commit_unit(&self.config.name).await?;
        }

        for diff in diffs {
            let matches: Vec<BigMapMatch> = self.matcher.match_diff(diff);
            for matched in matches {
                let dispatched = self
                    .ctx
                    .fire_handler(&self.config.name, &matched.handler.callback, HandlerPayload::BigMap(matched.diff))
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
