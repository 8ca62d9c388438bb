//! The datasource client: combines paged historical fetch over HTTP with a
//! live WebSocket subscription behind one interface, per level/rollback
//! semantics an index's engine loop can drive directly.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tzindex_core::types::{BigMapDiff, Operation};

use crate::error::DatasourceError;
use crate::http::{HttpClientConfig, HttpDatasourceClient};
use crate::stream::{run_live, FlushedEvent};
use crate::ws::{WsClientConfig, WsDatasourceClient};

/// A datasource: historical backfill plus a live push subscription.
#[async_trait]
pub trait DatasourceClient: Send + Sync {
    async fn fetch_operations(&self, level_from: u64, level_to: u64) -> Result<Vec<Operation>, DatasourceError>;
    async fn fetch_bigmaps(&self, level_from: u64, level_to: u64) -> Result<Vec<BigMapDiff>, DatasourceError>;
    async fn current_head_level(&self) -> Result<u64, DatasourceError>;

    /// Open a live subscription for the given contracts and big-map paths.
    /// Returned events are already buffered to one flush per level (or a
    /// rollback notification) — see [`crate::stream`].
    fn subscribe(&self, contracts: Vec<String>, bigmap_paths: Vec<String>) -> mpsc::Receiver<FlushedEvent>;
}

/// Configuration for [`TzktDatasource`] (named after the wire shape it
/// speaks, a TzKT-like REST + WebSocket API).
#[derive(Debug, Clone)]
pub struct TzktDatasourceConfig {
    pub http: HttpClientConfig,
    pub ws: WsClientConfig,
    /// How long the live buffer waits for more messages at the same level
    /// before flushing on quiescence.
    pub quiescence: Duration,
    pub event_channel_capacity: usize,
}

impl Default for TzktDatasourceConfig {
    fn default() -> Self {
        Self {
            http: HttpClientConfig::default(),
            ws: WsClientConfig::default(),
            quiescence: Duration::from_millis(750),
            event_channel_capacity: 256,
        }
    }
}

pub struct TzktDatasource {
    http: HttpDatasourceClient,
    ws_url: String,
    config: TzktDatasourceConfig,
}

impl TzktDatasource {
    pub fn new(name: impl Into<String>, rest_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self::with_config(name, rest_url, ws_url, TzktDatasourceConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        rest_url: impl Into<String>,
        ws_url: impl Into<String>,
        config: TzktDatasourceConfig,
    ) -> Self {
        let name = name.into();
        Self {
            http: HttpDatasourceClient::new(name, rest_url, config.http.clone()),
            ws_url: ws_url.into(),
            config,
        }
    }
}

#[async_trait]
impl DatasourceClient for TzktDatasource {
    async fn fetch_operations(&self, level_from: u64, level_to: u64) -> Result<Vec<Operation>, DatasourceError> {
        self.http.fetch_operations(level_from, level_to).await
    }

    async fn fetch_bigmaps(&self, level_from: u64, level_to: u64) -> Result<Vec<BigMapDiff>, DatasourceError> {
        self.http.fetch_bigmaps(level_from, level_to).await
    }

    async fn current_head_level(&self) -> Result<u64, DatasourceError> {
        self.http.current_head_level().await
    }

    fn subscribe(&self, contracts: Vec<String>, bigmap_paths: Vec<String>) -> mpsc::Receiver<FlushedEvent> {
        let ws = WsDatasourceClient::connect(self.ws_url.clone(), contracts, bigmap_paths, self.config.ws.clone());
        let rx = ws.subscribe();
        let (out_tx, out_rx) = mpsc::channel(self.config.event_channel_capacity);
        let quiescence = self.config.quiescence;

        tokio::spawn(async move {
            // Keep `ws` alive for the lifetime of the forwarding task — its
            // background reconnect loop would otherwise be dropped.
            let _ws = ws;
            run_live(rx, quiescence, out_tx).await;
        });

        out_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quiescence_is_sub_second() {
        let config = TzktDatasourceConfig::default();
        assert!(config.quiescence < Duration::from_secs(2));
    }
}
