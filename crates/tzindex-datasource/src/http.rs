//! Paged HTTP client for historical backfill.
//!
//! Fetches operations and big-map diffs page by page between a known cursor
//! and the current chain head, with retry and a circuit breaker for
//! transient failures.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::DatasourceError;
use crate::retry::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};
use crate::wire::{RawBigMapDiff, RawOperation};
use tzindex_core::types::{BigMapDiff, Operation};

/// Configuration for [`HttpDatasourceClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub request_timeout: Duration,
    /// Page size (`Δ`) used when requesting `[level_from, level_from + page_size]`.
    pub page_size: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            request_timeout: Duration::from_secs(30),
            page_size: 1000,
        }
    }
}

/// HTTP client for a REST-like datasource endpoint, with retry + circuit
/// breaker baked in.
pub struct HttpDatasourceClient {
    name: String,
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    circuit: CircuitBreaker,
    page_size: u64,
}

impl HttpDatasourceClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, config: HttpClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build reqwest client");

        Self {
            name: name.into(),
            base_url: base_url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            circuit: CircuitBreaker::new(config.circuit_breaker),
            page_size: config.page_size,
        }
    }

    pub fn default_for(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::new(name, base_url, HttpClientConfig::default())
    }

    /// Fetch every operation in `[level_from, level_to]`, sorted by
    /// `(level, counter, index_in_group)`, following pages of `page_size`.
    pub async fn fetch_operations(
        &self,
        level_from: u64,
        level_to: u64,
    ) -> Result<Vec<Operation>, DatasourceError> {
        let mut out = Vec::new();
        let mut cursor = level_from;

        while cursor <= level_to {
            let page_end = (cursor + self.page_size).min(level_to);
            let path = format!("operations?level.ge={cursor}&level.le={page_end}");
            let raws: Vec<RawOperation> = self.get_with_retry(&path).await?;
            out.extend(raws.into_iter().map(Operation::from));
            cursor = page_end + 1;
        }

        out.sort_by(|a, b| (a.level, a.counter, a.index_in_group).cmp(&(b.level, b.counter, b.index_in_group)));
        Ok(out)
    }

    /// Fetch every big-map diff in `[level_from, level_to]`.
    pub async fn fetch_bigmaps(
        &self,
        level_from: u64,
        level_to: u64,
    ) -> Result<Vec<BigMapDiff>, DatasourceError> {
        let mut out = Vec::new();
        let mut cursor = level_from;

        while cursor <= level_to {
            let page_end = (cursor + self.page_size).min(level_to);
            let path = format!("bigmaps/updates?level.ge={cursor}&level.le={page_end}");
            let raws: Vec<RawBigMapDiff> = self.get_with_retry(&path).await?;
            out.extend(raws.into_iter().map(BigMapDiff::from));
            cursor = page_end + 1;
        }

        out.sort_by_key(|d| (d.level, d.index_in_block));
        Ok(out)
    }

    /// Current chain head level, per the datasource's `/head` endpoint.
    pub async fn current_head_level(&self) -> Result<u64, DatasourceError> {
        #[derive(serde::Deserialize)]
        struct Head {
            level: u64,
        }
        let head: Head = self.get_with_retry("head").await?;
        Ok(head.level)
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DatasourceError> {
        if !self.circuit.is_allowed() {
            return Err(DatasourceError::CircuitOpen { name: self.name.clone() });
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.get_once(path).await {
                Ok(value) => {
                    self.circuit.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    self.circuit.record_failure();
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            warn!(attempt, delay_ms = delay.as_millis(), error = %e, datasource = %self.name, "retrying request");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(attempt, error = %e, datasource = %self.name, "max retries exceeded");
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DatasourceError> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DatasourceError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DatasourceError::Http(format!("HTTP {status}: {body}")));
        }

        let value = resp
            .json::<T>()
            .await
            .map_err(|e| DatasourceError::Malformed(e.to_string()))?;
        debug!(url = %url, "fetched page");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_page_size() {
        let config = HttpClientConfig::default();
        assert_eq!(config.page_size, 1000);
    }
}
