//! Error taxonomy for the indexing pipeline.

use thiserror::Error;

/// Errors that can occur while configuring, running, or tearing down an index.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "schema migration required: current spec_version {current}, framework requires {required}"
    )]
    MigrationRequired { current: String, required: String },

    #[error(
        "could not import handler '{name}' from module '{module}': init not run, name mismatch, \
         invalid package config, or PYTHONPATH-equivalent misconfiguration"
    )]
    HandlerImport { module: String, name: String },

    #[error("contract '{name}' already registered at address '{address}'")]
    ContractAlreadyExists { name: String, address: String },

    #[error("index '{name}' already exists")]
    IndexAlreadyExists { name: String },

    #[error("invalid data for index '{index}': {reason}")]
    InvalidData { index: String, reason: String },

    #[error("callback '{name}' ({kind}) failed: {source}")]
    Callback {
        kind: CallbackKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "callback '{name}' called with {got} argument(s), expected {expected} for pattern of that length"
    )]
    CallbackType {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("callback '{name}' is not implemented")]
    CallbackNotImplemented { name: String },

    #[error("'init' has not been run for this package yet")]
    InitializationRequired,

    #[error("template '{template}' is missing value for key '{key}' (index '{index}')")]
    MissingTemplateValue {
        index: String,
        template: String,
        key: String,
    },

    #[error("datasource error: {0}")]
    Datasource(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(
        "rollback to level {to_level} detected, from level {from_level}; {unrecoverable_index} \
         cannot reverse its own effects"
    )]
    RollbackUnrecoverable {
        from_level: u64,
        to_level: u64,
        unrecoverable_index: String,
    },

    #[error("{0}")]
    Other(String),

    #[error("index '{index}' requested control action: {detail}")]
    ControlRequested { index: String, detail: String },
}

/// Distinguishes a handler callback from a lifecycle hook callback in error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Handler,
    Hook,
}

impl std::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler => write!(f, "handler"),
            Self::Hook => write!(f, "hook"),
        }
    }
}

impl IndexerError {
    /// Whether this error should trigger a full reindex rather than a plain process exit.
    pub fn requires_reindex(&self) -> bool {
        matches!(
            self,
            Self::MigrationRequired { .. } | Self::RollbackUnrecoverable { .. }
        )
    }

    /// Whether this error is fatal to the whole process, as opposed to a rejected
    /// runtime mutation that the indexer can keep running past.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ContractAlreadyExists { .. } | Self::IndexAlreadyExists { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
