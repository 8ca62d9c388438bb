//! tzindex-core — data model, operation matcher, and index state machine for
//! the selective indexing engine.
//!
//! # Architecture
//!
//! ```text
//! Config → IndexState (per index)
//!              ├── Cursor           (committed level, confirmation depth)
//!              ├── OperationCache   (group buffering + pattern matching)
//!              ├── LevelWindow      (buffered-level rollback scoping)
//!              └── IndexStateStore  (memory / SQLite / Postgres, in tzindex-storage)
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod log_config;
pub mod matcher;
pub mod rollback;
pub mod schema_hash;
pub mod state;
pub mod state_store;
pub mod storage_traits;
pub mod types;
pub mod validate;

pub use config::Config;
pub use cursor::Cursor;
pub use error::{CallbackKind, IndexerError, Result};
pub use log_config::{LogConfig, LogFormat, LogLevel};
pub use matcher::{BigMapMatch, BigMapMatcher, Match, OperationCache};
pub use rollback::{affected_indexes, LevelWindow, RollbackEvent};
pub use schema_hash::schema_hash;
pub use state::{IndexRuntimeConfig, IndexState, IndexStatus};
pub use state_store::{IndexStateManager, IndexStateRecord, IndexStateStore, MemoryIndexStateStore};
pub use storage_traits::{CommitUnit, ContractRegistry, ReindexCapable, SqlCapable, TransactionalStore};
pub use types::{
    BigMapAction, BigMapDiff, BigMapHandlerConfig, Contract, GroupKey, HandlerConfig, IndexConfig,
    Operation, OperationGroup, OperationKind, PatternItem, TemplateValues,
};
