//! tzindex CLI — run a configured indexer, or print the handler/hook stubs a
//! configuration requires.
//!
//! ```bash
//! tzindex run  -c dipdup.yml
//! tzindex init -c dipdup.yml
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tokio::task::JoinSet;

use tzindex_callbacks::{CallbackManager, Context};
use tzindex_core::config::{Config, Database, DatasourceKind};
use tzindex_core::log_config::{LogConfig, LogFormat};
use tzindex_core::types::IndexConfig;
use tzindex_core::{ContractRegistry, IndexerError, IndexStateStore, ReindexCapable, SqlCapable, TransactionalStore};
use tzindex_datasource::{DatasourceClient, TzktDatasource};
use tzindex_engine::{BigMapIndexEngineBuilder, EngineOutcome, IndexEngineBuilder};

#[derive(Parser)]
#[command(name = "tzindex", version, about = "Selective indexing engine for Tezos")]
struct Cli {
    /// Path to the indexer configuration document.
    #[arg(short = 'c', long = "config", default_value = "dipdup.yml")]
    config: PathBuf,

    /// Path to a logging-configuration document. Defaults to a text,
    /// info-level logger driven by `RUST_LOG` if unset.
    #[arg(short = 'l', long = "logging-config")]
    logging_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect every configured datasource and run every configured index.
    Run,
    /// Print the handler/hook callback stubs this configuration requires.
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = match &cli.logging_config {
        Some(path) => match load_log_config(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load logging config {}: {err}", path.display());
                return ExitCode::from(1);
            }
        },
        None => LogConfig::default(),
    };
    init_tracing(&log_config);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config {}: {err}", cli.config.display());
            return ExitCode::from(1);
        }
    };

    match cli.command {
        Command::Init => init_stubs(&config),
        Command::Run => {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(err) => {
                    eprintln!("failed to start async runtime: {err}");
                    return ExitCode::from(1);
                }
            };
            match runtime.block_on(run(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    tracing::error!(error = %err, "tzindex exited with an error");
                    ExitCode::from(exit_code_for(&err))
                }
            }
        }
    }
}

fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.as_env_filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match config.format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Text => subscriber.try_init(),
    };
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

fn load_log_config(path: &Path) -> anyhow::Result<LogConfig> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Exit codes follow the convention: 0 success, 1 generic configuration or
/// runtime error, 2 migration required, 3 a handler could not be resolved,
/// 4 a callback raised an error.
///
/// A reindex/restart request (`ControlRequested`) also exits 1 — a
/// supervising process is expected to notice the non-zero status and
/// relaunch, the same as any other fatal error.
fn exit_code_for(err: &IndexerError) -> u8 {
    match err {
        IndexerError::MigrationRequired { .. } => 2,
        IndexerError::HandlerImport { .. } | IndexerError::InitializationRequired => 3,
        IndexerError::Callback { .. } | IndexerError::CallbackType { .. } | IndexerError::CallbackNotImplemented { .. } => 4,
        _ => 1,
    }
}

/// Print the callback names a configuration references, grouped by kind, so
/// an embedding application knows which handlers/hooks to register with the
/// `CallbackManager` before calling `run`.
fn init_stubs(config: &Config) -> ExitCode {
    println!("# Callback stubs required by package '{}'\n", config.package);

    let mut handler_names = Vec::new();
    for index in config.indexes.values() {
        match index {
            IndexConfig::Operation { handlers, .. } => {
                handler_names.extend(handlers.iter().map(|h| h.callback.clone()));
            }
            IndexConfig::BigMap { handlers, .. } => {
                handler_names.extend(handlers.iter().map(|h| h.callback.clone()));
            }
            IndexConfig::Template { .. } => {}
        }
    }
    for template in config.templates.values() {
        handler_names.extend(template.handlers.iter().map(|h| h.callback.clone()));
    }
    handler_names.sort();
    handler_names.dedup();

    println!("## Handlers");
    for name in &handler_names {
        println!("async fn {name}(ctx: Arc<Context>, payload: HandlerPayload) -> anyhow::Result<()> {{ todo!() }}");
    }

    let mut hook_names: Vec<&str> = config.hooks.values().map(|h| h.callback.as_str()).collect();
    hook_names.sort();
    hook_names.dedup();

    println!("\n## Hooks");
    for name in &hook_names {
        println!("async fn {name}(ctx: Arc<Context>, args: Vec<serde_json::Value>) -> anyhow::Result<()> {{ todo!() }}");
    }

    ExitCode::SUCCESS
}

/// Build every storage/datasource/engine component from `config` and run
/// every resolved index to completion (or until a callback requests control).
async fn run(mut config: Config) -> tzindex_core::Result<()> {
    let callbacks = Arc::new(CallbackManager::new());
    config.initialize(&callbacks.registered_handlers().iter().map(String::as_str).collect::<Vec<_>>())?;

    let (contracts, sql, state_store, transactions, reindexer): (
        Arc<dyn ContractRegistry>,
        Option<Arc<dyn SqlCapable>>,
        Arc<dyn IndexStateStore>,
        Option<Arc<dyn TransactionalStore>>,
        Arc<dyn ReindexCapable>,
    ) = match &config.database {
        Database::Sqlite { path } => {
            let storage = Arc::new(tzindex_storage::sqlite::SqliteStorage::open(path).await?);
            (
                storage.clone() as Arc<dyn ContractRegistry>,
                None,
                storage.clone() as Arc<dyn IndexStateStore>,
                Some(storage.clone() as Arc<dyn TransactionalStore>),
                storage as Arc<dyn ReindexCapable>,
            )
        }
        Database::Postgres { url, schema_name, immune_tables } => {
            let storage = Arc::new(
                tzindex_storage::postgres::PostgresStorage::connect(url, schema_name, immune_tables.clone()).await?,
            );
            (
                storage.clone() as Arc<dyn ContractRegistry>,
                Some(storage.clone() as Arc<dyn SqlCapable>),
                storage.clone() as Arc<dyn IndexStateStore>,
                Some(storage.clone() as Arc<dyn TransactionalStore>),
                storage as Arc<dyn ReindexCapable>,
            )
        }
    };

    let mut datasources: HashMap<String, Arc<dyn DatasourceClient>> = HashMap::new();
    for (name, ds) in &config.datasources {
        match ds.kind {
            DatasourceKind::TzktLike => {
                let ws_url = ds.url.replacen("http", "ws", 1);
                let client: Arc<dyn DatasourceClient> = Arc::new(TzktDatasource::new(name.clone(), ds.url.clone(), ws_url));
                datasources.insert(name.clone(), client);
            }
        }
    }

    let (ctx, mut spawn_rx) = Context::new(
        config.package.clone(),
        config.clone(),
        datasources.clone(),
        contracts,
        sql,
        HashMap::new(),
        callbacks,
        transactions,
    );
    let ctx = Arc::new(ctx);

    let mut join_set: JoinSet<(String, tzindex_core::Result<EngineOutcome>)> = JoinSet::new();
    for index in config.indexes.values() {
        if matches!(index, IndexConfig::Template { .. }) {
            // Templates resolve into Operation (and optionally a companion
            // BigMap) entries during `Config::initialize`; a bare template
            // reaching this loop was never materialised into a concrete index.
            continue;
        }
        spawn_index(index.clone(), &datasources, &state_store, &ctx, &mut join_set)?;
    }

    let mut control: Option<(String, tzindex_callbacks::ControlOutcome)> = None;

    while !join_set.is_empty() && control.is_none() {
        tokio::select! {
            Some(name) = spawn_rx.recv() => {
                let index = {
                    let config = ctx.config().await;
                    config.indexes.get(&name).cloned()
                };
                match index {
                    Some(index) => spawn_index(index, &datasources, &state_store, &ctx, &mut join_set)?,
                    None => tracing::warn!(index = %name, "add_index requested a spawn for an index no longer in the config"),
                }
            }
            Some(joined) = join_set.join_next() => {
                let (name, outcome) = joined.map_err(|e| IndexerError::Other(e.to_string()))?;
                match outcome? {
                    EngineOutcome::Stopped => {
                        tracing::info!(index = %name, "index stopped");
                    }
                    EngineOutcome::Control(outcome) => {
                        tracing::warn!(index = %name, ?outcome, "index requested control");
                        control = Some((name, outcome));
                    }
                }
            }
        }
    }

    join_set.shutdown().await;

    if let Some((name, outcome)) = control {
        let detail = match outcome {
            tzindex_callbacks::ControlOutcome::Restart => "restart requested".to_string(),
            tzindex_callbacks::ControlOutcome::Reindex { reason } => {
                reindexer.reindex().await?;
                reason.unwrap_or_else(|| "reindex requested".to_string())
            }
        };
        return Err(IndexerError::ControlRequested { index: name, detail });
    }

    Ok(())
}

/// Build the engine for one resolved (non-template) index and spawn it onto
/// `join_set`.
fn spawn_index(
    index: IndexConfig,
    datasources: &HashMap<String, Arc<dyn DatasourceClient>>,
    state_store: &Arc<dyn IndexStateStore>,
    ctx: &Arc<Context>,
    join_set: &mut JoinSet<(String, tzindex_core::Result<EngineOutcome>)>,
) -> tzindex_core::Result<()> {
    match index {
        IndexConfig::Operation {
            name,
            datasource,
            contracts,
            handlers,
            last_level,
        } => {
            let Some(client) = datasources.get(&datasource).cloned() else {
                return Err(IndexerError::Configuration(format!(
                    "index '{name}' references unknown datasource '{datasource}'"
                )));
            };

            let mut builder = IndexEngineBuilder::new(name.clone())
                .datasource(datasource.clone())
                .contracts(contracts);
            for handler in handlers {
                builder = builder.handler(handler.callback, handler.pattern);
            }
            if let Some(last) = last_level {
                builder = builder.last_level(last);
            }

            let store: Box<dyn IndexStateStore> = Box::new(state_store.clone());
            let mut engine = builder.build(client, store, ctx.clone());
            join_set.spawn(async move {
                let outcome = engine.run().await;
                (name, outcome)
            });
            Ok(())
        }
        IndexConfig::BigMap {
            name,
            datasource,
            handlers,
            last_level,
        } => {
            let Some(client) = datasources.get(&datasource).cloned() else {
                return Err(IndexerError::Configuration(format!(
                    "index '{name}' references unknown datasource '{datasource}'"
                )));
            };

            let mut builder = BigMapIndexEngineBuilder::new(name.clone()).datasource(datasource.clone());
            for handler in handlers {
                builder = builder.handler(handler.callback, handler.contract, handler.path);
            }
            if let Some(last) = last_level {
                builder = builder.last_level(last);
            }

            let store: Box<dyn IndexStateStore> = Box::new(state_store.clone());
            let mut engine = builder.build(client, store, ctx.clone());
            join_set.spawn(async move {
                let outcome = engine.run().await;
                (name, outcome)
            });
            Ok(())
        }
        IndexConfig::Template { name, .. } => Err(IndexerError::Configuration(format!(
            "template index '{name}' was never resolved to a concrete index"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_maps_migration_required_to_two() {
        let err = IndexerError::MigrationRequired {
            current: "1.0".into(),
            required: "2.0".into(),
        };
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn exit_code_maps_handler_import_to_three() {
        let err = IndexerError::HandlerImport {
            module: "demo".into(),
            name: "on_mint".into(),
        };
        assert_eq!(exit_code_for(&err), 3);
    }

    #[test]
    fn exit_code_maps_generic_configuration_to_one() {
        let err = IndexerError::Configuration("bad".into());
        assert_eq!(exit_code_for(&err), 1);
    }
}
