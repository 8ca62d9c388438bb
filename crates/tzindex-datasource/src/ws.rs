//! WebSocket live-subscription client with auto-reconnect.
//!
//! Maintains a background task that owns the WebSocket connection and
//! broadcasts decoded [`PushMessage`]s to every subscriber. On disconnect it
//! reconnects with exponential backoff and replays the subscribe request, so
//! callers never see a gap beyond whatever the datasource itself redelivers.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::wire::PushMessage;

/// Configuration for [`WsDatasourceClient`].
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub channel_capacity: usize,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            channel_capacity: 1024,
        }
    }
}

/// A live WebSocket subscription to one or more contracts' operations and
/// big-map paths. Owns a background task for the life of the connection.
pub struct WsDatasourceClient {
    url: String,
    tx: broadcast::Sender<PushMessage>,
}

impl WsDatasourceClient {
    /// Connect to `url` and start subscribing to `contracts`/`bigmap_paths`
    /// in the background. Returns immediately; use [`subscribe`] to receive
    /// messages.
    pub fn connect(
        url: impl Into<String>,
        contracts: Vec<String>,
        bigmap_paths: Vec<String>,
        config: WsClientConfig,
    ) -> Self {
        let url = url.into();
        let (tx, _rx) = broadcast::channel(config.channel_capacity);
        let task_tx = tx.clone();
        let task_url = url.clone();

        tokio::spawn(async move {
            ws_task(task_url, contracts, bigmap_paths, task_tx, config).await;
        });

        Self { url, tx }
    }

    /// Subscribe to the decoded push-message stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.tx.subscribe()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn ws_task(
    url: String,
    contracts: Vec<String>,
    bigmap_paths: Vec<String>,
    tx: broadcast::Sender<PushMessage>,
    config: WsClientConfig,
) {
    let mut backoff = config.reconnect_initial;

    loop {
        info!(url = %url, "connecting to datasource over WebSocket");

        match tokio_tungstenite::connect_async(&url).await {
            Err(e) => {
                warn!(error = %e, backoff = ?backoff, "WS connect failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
            Ok((ws_stream, _)) => {
                backoff = config.reconnect_initial;
                let (mut sink, mut stream) = ws_stream.split();

                let subscribe_msg = json!({
                    "method": "subscribe",
                    "contracts": contracts,
                    "bigmap_paths": bigmap_paths,
                });
                if let Ok(text) = serde_json::to_string(&subscribe_msg) {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        warn!("failed to send subscribe request, reconnecting");
                        continue;
                    }
                }

                while let Some(item) = stream.next().await {
                    match item {
                        Err(e) => {
                            warn!(error = %e, "WS receive error, reconnecting");
                            break;
                        }
                        Ok(Message::Text(text)) => match serde_json::from_str::<PushMessage>(&text) {
                            Ok(msg) => {
                                if tx.send(msg).is_err() {
                                    // No active subscribers — not fatal, keep draining.
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to parse push message"),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                    }
                }

                warn!(url = %url, "WS disconnected, reconnecting");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_reconnect_bounds() {
        let config = WsClientConfig::default();
        assert!(config.reconnect_initial < config.reconnect_max);
    }
}
