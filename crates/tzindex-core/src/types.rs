//! Shared data model for the indexing pipeline: operations, groups, big-map
//! diffs, and the declarative index/handler/pattern configuration they are
//! matched against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

// ─── Operation ─────────────────────────────────────────────────────────────

/// The kind of on-chain action an [`Operation`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transaction,
    Origination,
}

/// A single on-chain operation as delivered by the datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub hash: String,
    pub counter: u64,
    pub level: u64,
    pub timestamp: i64,
    pub kind: OperationKind,
    pub sender_address: String,
    pub target_address: Option<String>,
    pub amount: i64,
    pub entrypoint: Option<String>,
    pub parameter: Option<serde_json::Value>,
    pub storage: Option<serde_json::Value>,
    /// For an origination, the typename of the contract it deployed (if
    /// known). `None` for transactions and originations of untyped contracts.
    pub originated_contract_type: Option<String>,
    /// Position within its operation group, used to break matching ties.
    pub index_in_group: u32,
}

impl Operation {
    /// Returns `true` if this operation satisfies every constraint in `item`.
    pub fn matches(&self, item: &PatternItem) -> bool {
        if self.kind != item.kind {
            return false;
        }
        if let Some(source) = &item.source {
            if &self.sender_address != source {
                return false;
            }
        }
        if let Some(destination) = &item.destination {
            if self.target_address.as_ref() != Some(destination) {
                return false;
            }
        }
        if let Some(entrypoint) = &item.entrypoint {
            if self.entrypoint.as_ref() != Some(entrypoint) {
                return false;
            }
        }
        if let Some(contract_type) = &item.originated_contract_type {
            if self.originated_contract_type.as_ref() != Some(contract_type) {
                return false;
            }
        }
        true
    }
}

/// Key identifying an [`OperationGroup`]: all operations sharing a
/// transaction hash and counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub hash: String,
    pub counter: u64,
}

/// An ordered set of operations sharing a transaction hash and counter.
/// Invariant: every operation in a group shares the same block level.
#[derive(Debug, Clone, Default)]
pub struct OperationGroup {
    pub operations: Vec<Operation>,
}

impl OperationGroup {
    pub fn level(&self) -> Option<u64> {
        self.operations.first().map(|op| op.level)
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }
}

// ─── Big-map diffs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BigMapAction {
    Allocate,
    AddKey,
    UpdateKey,
    RemoveKey,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigMapDiff {
    pub big_map_id: i64,
    pub level: u64,
    pub index_in_block: u32,
    pub action: BigMapAction,
    /// The originating contract, matched directly against a
    /// [`BigMapHandlerConfig`]'s `contract` field.
    pub contract: String,
    /// The storage path the big map is bound to, matched directly against a
    /// [`BigMapHandlerConfig`]'s `path` field.
    pub path: String,
    pub key: Option<serde_json::Value>,
    pub value: Option<serde_json::Value>,
}

// ─── Pattern / Handler / Index configuration ───────────────────────────────

/// One constraint in a handler's pattern, matched left-to-right against an
/// operation group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternItem {
    pub kind: OperationKind,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub entrypoint: Option<String>,
    pub originated_contract_type: Option<String>,
}

impl PatternItem {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            source: None,
            destination: None,
            entrypoint: None,
            originated_contract_type: None,
        }
    }

    pub fn destination(mut self, address: impl Into<String>) -> Self {
        self.destination = Some(address.into());
        self
    }

    pub fn entrypoint(mut self, name: impl Into<String>) -> Self {
        self.entrypoint = Some(name.into());
        self
    }

    pub fn originated_contract_type(mut self, typename: impl Into<String>) -> Self {
        self.originated_contract_type = Some(typename.into());
        self
    }
}

/// A declared handler: a name bound at registration time to a user callback,
/// plus the pattern that must match before it is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub callback: String,
    pub pattern: Vec<PatternItem>,
}

/// A (contract, storage path) pair bound to a big-map handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigMapHandlerConfig {
    pub callback: String,
    pub contract: String,
    pub path: String,
}

/// One monitored index, as resolved from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexConfig {
    Operation {
        name: String,
        datasource: String,
        contracts: Vec<String>,
        handlers: Vec<HandlerConfig>,
        /// Optional bound: once the cursor reaches this level the index
        /// becomes a one-shot index and disables itself instead of
        /// following the chain tip live.
        last_level: Option<u64>,
    },
    BigMap {
        name: String,
        datasource: String,
        handlers: Vec<BigMapHandlerConfig>,
        last_level: Option<u64>,
    },
    Template {
        name: String,
        template: String,
        values: TemplateValues,
    },
}

impl IndexConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Operation { name, .. } => name,
            Self::BigMap { name, .. } => name,
            Self::Template { name, .. } => name,
        }
    }
}

/// A template's substitution values, keyed by placeholder name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateValues(pub HashMap<String, String>);

impl TemplateValues {
    pub fn get(&self, index: &str, template: &str, key: &str) -> Result<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| IndexerError::MissingTemplateValue {
                index: index.to_string(),
                template: template.to_string(),
                key: key.to_string(),
            })
    }
}

/// A named smart-contract registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    pub address: String,
    pub typename: Option<String>,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind, sender: &str, dest: Option<&str>, entrypoint: Option<&str>) -> Operation {
        Operation {
            hash: "op1".into(),
            counter: 1,
            level: 100,
            timestamp: 1000,
            kind,
            sender_address: sender.into(),
            target_address: dest.map(String::from),
            amount: 0,
            entrypoint: entrypoint.map(String::from),
            parameter: None,
            storage: None,
            originated_contract_type: None,
            index_in_group: 0,
        }
    }

    #[test]
    fn operation_matches_pattern_item_on_entrypoint() {
        let item = PatternItem::new(OperationKind::Transaction)
            .destination("KT1abc")
            .entrypoint("mint");
        let matching = op(OperationKind::Transaction, "tz1x", Some("KT1abc"), Some("mint"));
        let wrong_entrypoint = op(OperationKind::Transaction, "tz1x", Some("KT1abc"), Some("burn"));
        assert!(matching.matches(&item));
        assert!(!wrong_entrypoint.matches(&item));
    }

    #[test]
    fn operation_matches_ignores_unset_constraints() {
        let item = PatternItem::new(OperationKind::Transaction);
        let any_dest = op(OperationKind::Transaction, "tz1x", Some("KT1anything"), Some("whatever"));
        assert!(any_dest.matches(&item));
    }

    #[test]
    fn operation_matches_pattern_item_on_originated_contract_type() {
        let item = PatternItem::new(OperationKind::Origination).originated_contract_type("fa2_token");
        let mut matching = op(OperationKind::Origination, "tz1x", None, None);
        matching.originated_contract_type = Some("fa2_token".into());
        let mut wrong_type = op(OperationKind::Origination, "tz1x", None, None);
        wrong_type.originated_contract_type = Some("fa1_token".into());
        let untyped = op(OperationKind::Origination, "tz1x", None, None);

        assert!(matching.matches(&item));
        assert!(!wrong_type.matches(&item));
        assert!(!untyped.matches(&item));
    }

    #[test]
    fn template_values_missing_key_names_index_and_key() {
        let values = TemplateValues::default();
        let err = values.get("my_index", "my_template", "token").unwrap_err();
        match err {
            IndexerError::MissingTemplateValue { index, template, key } => {
                assert_eq!(index, "my_index");
                assert_eq!(template, "my_template");
                assert_eq!(key, "token");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn group_level_is_first_operation_level() {
        let mut group = OperationGroup::default();
        assert_eq!(group.level(), None);
        group.push(op(OperationKind::Transaction, "tz1x", None, None));
        assert_eq!(group.level(), Some(100));
    }
}
