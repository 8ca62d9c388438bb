//! Fluent builder API for assembling an [`IndexEngine`](crate::engine::IndexEngine)
//! from its component parts.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tzindex_engine::IndexEngineBuilder;
//! # async fn example(
//! #     datasource: Arc<dyn tzindex_datasource::DatasourceClient>,
//! #     state_store: Box<dyn tzindex_core::state_store::IndexStateStore>,
//! #     ctx: Arc<tzindex_callbacks::Context>,
//! # ) {
//! let mut engine = IndexEngineBuilder::new("hen_sales")
//!     .contracts(vec!["KT1hen".into()])
//!     .first_level(1_365_000)
//!     .confirmation_depth(2)
//!     .batch_size(1000)
//!     .handler("on_sale", vec![])
//!     .build(datasource, state_store, ctx);
//! engine.run().await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use tzindex_callbacks::Context;
use tzindex_core::state::IndexRuntimeConfig;
use tzindex_core::state_store::{IndexStateManager, IndexStateStore};
use tzindex_core::types::{BigMapHandlerConfig, HandlerConfig};
use tzindex_datasource::DatasourceClient;

use crate::bigmap_engine::BigMapIndexEngine;
use crate::engine::IndexEngine;

/// Fluent builder for one operation index's [`IndexEngine`].
pub struct IndexEngineBuilder {
    name: String,
    datasource_name: String,
    contracts: Vec<String>,
    handlers: Vec<HandlerConfig>,
    first_level: u64,
    last_level: Option<u64>,
    confirmation_depth: u64,
    batch_size: u64,
}

impl IndexEngineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasource_name: String::new(),
            contracts: Vec::new(),
            handlers: Vec::new(),
            first_level: 0,
            last_level: None,
            confirmation_depth: 2,
            batch_size: 1000,
        }
    }

    pub fn datasource(mut self, name: impl Into<String>) -> Self {
        self.datasource_name = name.into();
        self
    }

    pub fn contracts(mut self, contracts: Vec<String>) -> Self {
        self.contracts = contracts;
        self
    }

    pub fn first_level(mut self, level: u64) -> Self {
        self.first_level = level;
        self
    }

    /// Bound the index — it becomes a one-shot backfill and disables itself
    /// at this level rather than transitioning to realtime.
    pub fn last_level(mut self, level: u64) -> Self {
        self.last_level = Some(level);
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    /// Number of levels fetched per backfill batch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn handler(mut self, callback: impl Into<String>, pattern: Vec<tzindex_core::types::PatternItem>) -> Self {
        self.handlers.push(HandlerConfig {
            callback: callback.into(),
            pattern,
        });
        self
    }

    pub fn build(
        self,
        datasource: Arc<dyn DatasourceClient>,
        state_store: Box<dyn IndexStateStore>,
        ctx: Arc<Context>,
    ) -> IndexEngine {
        let config = IndexRuntimeConfig {
            name: self.name.clone(),
            datasource: self.datasource_name,
            first_level: self.first_level,
            last_level: self.last_level,
            confirmation_depth: self.confirmation_depth,
        };
        let state_store = IndexStateManager::new(state_store, self.name);
        IndexEngine::new(config, self.contracts, datasource, self.handlers, state_store, ctx, self.batch_size)
    }
}

/// Fluent builder for one big-map index's [`BigMapIndexEngine`].
pub struct BigMapIndexEngineBuilder {
    name: String,
    datasource_name: String,
    handlers: Vec<BigMapHandlerConfig>,
    first_level: u64,
    last_level: Option<u64>,
    confirmation_depth: u64,
    batch_size: u64,
}

impl BigMapIndexEngineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasource_name: String::new(),
            handlers: Vec::new(),
            first_level: 0,
            last_level: None,
            confirmation_depth: 2,
            batch_size: 1000,
        }
    }

    pub fn datasource(mut self, name: impl Into<String>) -> Self {
        self.datasource_name = name.into();
        self
    }

    pub fn first_level(mut self, level: u64) -> Self {
        self.first_level = level;
        self
    }

    pub fn last_level(mut self, level: u64) -> Self {
        self.last_level = Some(level);
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn handler(mut self, callback: impl Into<String>, contract: impl Into<String>, path: impl Into<String>) -> Self {
        self.handlers.push(BigMapHandlerConfig {
            callback: callback.into(),
            contract: contract.into(),
            path: path.into(),
        });
        self
    }

    pub fn build(
        self,
        datasource: Arc<dyn DatasourceClient>,
        state_store: Box<dyn IndexStateStore>,
        ctx: Arc<Context>,
    ) -> BigMapIndexEngine {
        let config = IndexRuntimeConfig {
            name: self.name.clone(),
            datasource: self.datasource_name,
            first_level: self.first_level,
            last_level: self.last_level,
            confirmation_depth: self.confirmation_depth,
        };
        let state_store = IndexStateManager::new(state_store, self.name);
        BigMapIndexEngine::new(config, datasource, self.handlers, state_store, ctx, self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = IndexEngineBuilder::new("hen_sales");
        assert_eq!(builder.name, "hen_sales");
        assert_eq!(builder.confirmation_depth, 2);
        assert_eq!(builder.batch_size, 1000);
        assert!(builder.last_level.is_none());
    }

    #[test]
    fn builder_custom_fields_stick() {
        let builder = IndexEngineBuilder::new("hen_sales")
            .datasource("tzkt_mainnet")
            .contracts(vec!["KT1hen".into()])
            .first_level(1_365_000)
            .last_level(2_000_000)
            .confirmation_depth(5)
            .batch_size(500);

        assert_eq!(builder.datasource_name, "tzkt_mainnet");
        assert_eq!(builder.contracts, vec!["KT1hen".to_string()]);
        assert_eq!(builder.first_level, 1_365_000);
        assert_eq!(builder.last_level, Some(2_000_000));
        assert_eq!(builder.confirmation_depth, 5);
        assert_eq!(builder.batch_size, 500);
    }

    #[test]
    fn bigmap_builder_collects_handlers() {
        let builder = BigMapIndexEngineBuilder::new("ledger_idx")
            .datasource("tzkt_mainnet")
            .handler("on_ledger", "KT1abc", "ledger");

        assert_eq!(builder.name, "ledger_idx");
        assert_eq!(builder.handlers.len(), 1);
        assert_eq!(builder.handlers[0].contract, "KT1abc");
        assert_eq!(builder.handlers[0].path, "ledger");
    }
}
