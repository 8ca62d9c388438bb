//! tzindex-datasource — paged historical backfill plus live push
//! subscription over HTTP/WebSocket, with retry, a circuit breaker, and
//! level-buffered delivery.

pub mod client;
pub mod error;
pub mod http;
pub mod retry;
pub mod stream;
pub mod wire;
pub mod ws;

pub use client::{DatasourceClient, TzktDatasource, TzktDatasourceConfig};
pub use error::DatasourceError;
pub use stream::FlushedEvent;
