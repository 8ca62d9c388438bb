//! In-memory configuration shape. Parsing a YAML document into this type is
//! an external collaborator (the CLI's job); the core only ever operates on
//! an already-validated [`Config`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::types::{BigMapHandlerConfig, Contract, HandlerConfig, IndexConfig, TemplateValues};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Database {
    Sqlite {
        path: String,
    },
    Postgres {
        url: String,
        schema_name: String,
        #[serde(default)]
        immune_tables: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    pub url: String,
    pub kind: DatasourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceKind {
    TzktLike,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub contracts: Vec<String>,
    pub handlers: Vec<HandlerConfig>,
    #[serde(default)]
    pub big_map_handlers: Vec<BigMapHandlerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub callback: String,
    #[serde(default)]
    pub atomic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub spec_version: String,
    pub package: String,
    pub database: Database,
    #[serde(default)]
    pub contracts: HashMap<String, Contract>,
    #[serde(default)]
    pub datasources: HashMap<String, DatasourceConfig>,
    #[serde(default)]
    pub templates: HashMap<String, Template>,
    pub indexes: HashMap<String, IndexConfig>,
    #[serde(default)]
    pub hooks: HashMap<String, HookConfig>,
}

impl Config {
    /// Resolve every `IndexConfig::Template` reference against its declared
    /// `Template`, producing concrete `Operation`/`BigMap` index configs.
    /// Also validates that every handler/hook name referenced anywhere in
    /// the config is present in `known_callbacks` — this is the step that
    /// must be re-run for a runtime `add_index`/`add_contract` mutation to
    /// become visible to later callbacks.
    pub fn initialize(&mut self, known_callbacks: &[&str]) -> Result<()> {
        let mut resolved = HashMap::new();

        for (key, index) in &self.indexes {
            match index {
                IndexConfig::Template { name, template, values } => {
                    let tmpl = self.templates.get(template).ok_or_else(|| {
                        IndexerError::Configuration(format!(
                            "index '{name}' references unknown template '{template}'"
                        ))
                    })?;
                    for handler in &tmpl.handlers {
                        if !known_callbacks.contains(&handler.callback.as_str()) {
                            return Err(IndexerError::HandlerImport {
                                module: self.package.clone(),
                                name: handler.callback.clone(),
                            });
                        }
                    }

                    let contracts = tmpl
                        .contracts
                        .iter()
                        .map(|c| substitute(c, name, template, values))
                        .collect::<Result<Vec<_>>>()?;
                    let handlers = tmpl
                        .handlers
                        .iter()
                        .map(|h| {
                            let mut h = h.clone();
                            for item in &mut h.pattern {
                                if let Some(dest) = &item.destination {
                                    item.destination = Some(substitute(dest, name, template, values)?);
                                }
                            }
                            Ok(h)
                        })
                        .collect::<Result<Vec<_>>>()?;

                    resolved.insert(
                        key.clone(),
                        IndexConfig::Operation {
                            name: name.clone(),
                            datasource: self
                                .datasources
                                .keys()
                                .next()
                                .cloned()
                                .unwrap_or_default(),
                            contracts,
                            handlers,
                            last_level: None,
                        },
                    );

                    if !tmpl.big_map_handlers.is_empty() {
                        for handler in &tmpl.big_map_handlers {
                            if !known_callbacks.contains(&handler.callback.as_str()) {
                                return Err(IndexerError::HandlerImport {
                                    module: self.package.clone(),
                                    name: handler.callback.clone(),
                                });
                            }
                        }
                        let bigmap_handlers = tmpl
                            .big_map_handlers
                            .iter()
                            .map(|h| {
                                Ok(BigMapHandlerConfig {
                                    callback: h.callback.clone(),
                                    contract: substitute(&h.contract, name, template, values)?,
                                    path: h.path.clone(),
                                })
                            })
                            .collect::<Result<Vec<_>>>()?;
                        resolved.insert(
                            format!("{key}__bigmap"),
                            IndexConfig::BigMap {
                                name: format!("{name}__bigmap"),
                                datasource: self
                                    .datasources
                                    .keys()
                                    .next()
                                    .cloned()
                                    .unwrap_or_default(),
                                handlers: bigmap_handlers,
                                last_level: None,
                            },
                        );
                    }
                }
                IndexConfig::Operation { handlers, .. } => {
                    for handler in handlers {
                        if !known_callbacks.contains(&handler.callback.as_str()) {
                            return Err(IndexerError::HandlerImport {
                                module: self.package.clone(),
                                name: handler.callback.clone(),
                            });
                        }
                    }
                    resolved.insert(key.clone(), index.clone());
                }
                IndexConfig::BigMap { handlers, .. } => {
                    for handler in handlers {
                        if !known_callbacks.contains(&handler.callback.as_str()) {
                            return Err(IndexerError::HandlerImport {
                                module: self.package.clone(),
                                name: handler.callback.clone(),
                            });
                        }
                    }
                    resolved.insert(key.clone(), index.clone());
                }
            }
        }

        for hook in self.hooks.values() {
            if !known_callbacks.contains(&hook.callback.as_str()) {
                return Err(IndexerError::HandlerImport {
                    module: self.package.clone(),
                    name: hook.callback.clone(),
                });
            }
        }

        self.indexes = resolved;
        Ok(())
    }
}

/// Substitute a single `<key>` placeholder in a template field value. A
/// value with no angle-bracket wrapping is returned unchanged.
fn substitute(value: &str, index: &str, template: &str, values: &TemplateValues) -> Result<String> {
    match value.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        Some(key) => values.get(index, template, key).map(str::to_string),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationKind, PatternItem};

    fn base_config() -> Config {
        Config {
            spec_version: "1.0".into(),
            package: "demo_tzcolors".into(),
            database: Database::Sqlite { path: ":memory:".into() },
            contracts: HashMap::new(),
            datasources: HashMap::new(),
            templates: HashMap::new(),
            indexes: HashMap::new(),
            hooks: HashMap::new(),
        }
    }

    #[test]
    fn initialize_resolves_template_reference() {
        let mut config = base_config();
        config.templates.insert(
            "auctions".into(),
            Template {
                contracts: vec!["tzcolors".into()],
                handlers: vec![HandlerConfig {
                    callback: "on_initial_auction".into(),
                    pattern: vec![PatternItem::new(OperationKind::Transaction)],
                }],
                big_map_handlers: vec![],
            },
        );
        config.indexes.insert(
            "tzcolors_auctions".into(),
            IndexConfig::Template {
                name: "tzcolors_auctions".into(),
                template: "auctions".into(),
                values: TemplateValues::default(),
            },
        );

        config.initialize(&["on_initial_auction"]).unwrap();
        assert!(matches!(
            config.indexes["tzcolors_auctions"],
            IndexConfig::Operation { .. }
        ));
    }

    #[test]
    fn initialize_rejects_unknown_callback() {
        let mut config = base_config();
        config.indexes.insert(
            "idx".into(),
            IndexConfig::Operation {
                name: "idx".into(),
                datasource: "tzkt_mainnet".into(),
                contracts: vec![],
                handlers: vec![HandlerConfig {
                    callback: "not_registered".into(),
                    pattern: vec![],
                }],
                last_level: None,
            },
        );

        let err = config.initialize(&[]).unwrap_err();
        assert!(matches!(err, IndexerError::HandlerImport { .. }));
    }

    #[test]
    fn initialize_substitutes_template_placeholder_into_contracts() {
        let mut config = base_config();
        config.templates.insert(
            "fa2_ledger".into(),
            Template {
                contracts: vec!["<token_address>".into()],
                handlers: vec![HandlerConfig {
                    callback: "on_transfer".into(),
                    pattern: vec![PatternItem::new(OperationKind::Transaction)
                        .destination("<token_address>")],
                }],
                big_map_handlers: vec![],
            },
        );
        let mut values = HashMap::new();
        values.insert("token_address".to_string(), "KT1abc".to_string());
        config.indexes.insert(
            "my_token".into(),
            IndexConfig::Template {
                name: "my_token".into(),
                template: "fa2_ledger".into(),
                values: TemplateValues(values),
            },
        );

        config.initialize(&["on_transfer"]).unwrap();
        let IndexConfig::Operation { contracts, handlers, .. } = &config.indexes["my_token"] else {
            panic!("expected a resolved operation index");
        };
        assert_eq!(contracts, &["KT1abc".to_string()]);
        assert_eq!(handlers[0].pattern[0].destination.as_deref(), Some("KT1abc"));
    }

    #[test]
    fn initialize_template_missing_value_is_reported() {
        let mut config = base_config();
        config.templates.insert(
            "fa2_ledger".into(),
            Template {
                contracts: vec!["<token_address>".into()],
                handlers: vec![],
                big_map_handlers: vec![],
            },
        );
        config.indexes.insert(
            "my_token".into(),
            IndexConfig::Template {
                name: "my_token".into(),
                template: "fa2_ledger".into(),
                values: TemplateValues::default(),
            },
        );

        let err = config.initialize(&[]).unwrap_err();
        assert!(matches!(err, IndexerError::MissingTemplateValue { .. }));
    }
}
