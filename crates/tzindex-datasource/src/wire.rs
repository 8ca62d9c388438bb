//! Wire-format DTOs for the datasource's JSON responses, and their
//! conversion into the core data model.

use serde::Deserialize;

use tzindex_core::types::{BigMapAction, BigMapDiff, Operation, OperationKind};

/// One operation as delivered by the datasource's REST/WS API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOperation {
    pub hash: String,
    pub counter: u64,
    pub level: u64,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: RawOperationKind,
    pub sender: String,
    pub target: Option<String>,
    #[serde(default)]
    pub amount: i64,
    pub entrypoint: Option<String>,
    pub parameter: Option<serde_json::Value>,
    pub storage: Option<serde_json::Value>,
    #[serde(default)]
    pub originated_contract_type: Option<String>,
    #[serde(default)]
    pub index_in_group: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawOperationKind {
    Transaction,
    Origination,
}

impl From<RawOperationKind> for OperationKind {
    fn from(k: RawOperationKind) -> Self {
        match k {
            RawOperationKind::Transaction => OperationKind::Transaction,
            RawOperationKind::Origination => OperationKind::Origination,
        }
    }
}

impl From<RawOperation> for Operation {
    fn from(raw: RawOperation) -> Self {
        Operation {
            hash: raw.hash,
            counter: raw.counter,
            level: raw.level,
            timestamp: raw.timestamp,
            kind: raw.kind.into(),
            sender_address: raw.sender,
            target_address: raw.target,
            amount: raw.amount,
            entrypoint: raw.entrypoint,
            parameter: raw.parameter,
            storage: raw.storage,
            originated_contract_type: raw.originated_contract_type,
            index_in_group: raw.index_in_group,
        }
    }
}

/// One big-map diff as delivered by the datasource.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBigMapDiff {
    pub big_map_id: i64,
    pub level: u64,
    #[serde(default)]
    pub index_in_block: u32,
    pub action: RawBigMapAction,
    pub contract: String,
    pub path: String,
    pub key: Option<serde_json::Value>,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawBigMapAction {
    Allocate,
    AddKey,
    UpdateKey,
    RemoveKey,
    Remove,
}

impl From<RawBigMapAction> for BigMapAction {
    fn from(a: RawBigMapAction) -> Self {
        match a {
            RawBigMapAction::Allocate => BigMapAction::Allocate,
            RawBigMapAction::AddKey => BigMapAction::AddKey,
            RawBigMapAction::UpdateKey => BigMapAction::UpdateKey,
            RawBigMapAction::RemoveKey => BigMapAction::RemoveKey,
            RawBigMapAction::Remove => BigMapAction::Remove,
        }
    }
}

impl From<RawBigMapDiff> for BigMapDiff {
    fn from(raw: RawBigMapDiff) -> Self {
        BigMapDiff {
            big_map_id: raw.big_map_id,
            level: raw.level,
            index_in_block: raw.index_in_block,
            action: raw.action.into(),
            contract: raw.contract,
            path: raw.path,
            key: raw.key,
            value: raw.value,
        }
    }
}

/// A live-subscription push message: either a batch of operations at a
/// level, a batch of big-map diffs, or a rollback notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushMessage {
    Operations { level: u64, operations: Vec<RawOperation> },
    BigMaps { level: u64, diffs: Vec<RawBigMapDiff> },
    Rollback { level: u64 },
    Head { level: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_operation_converts_to_operation() {
        let raw = RawOperation {
            hash: "op1".into(),
            counter: 1,
            level: 100,
            timestamp: 0,
            kind: RawOperationKind::Transaction,
            sender: "tz1x".into(),
            target: Some("KT1abc".into()),
            amount: 0,
            entrypoint: Some("mint".into()),
            parameter: None,
            storage: None,
            originated_contract_type: None,
            index_in_group: 0,
        };
        let op: Operation = raw.into();
        assert_eq!(op.kind, OperationKind::Transaction);
        assert_eq!(op.target_address.as_deref(), Some("KT1abc"));
    }

    #[test]
    fn push_message_tags_rollback_by_kind() {
        let json = r#"{"kind":"rollback","level":500}"#;
        let msg: PushMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, PushMessage::Rollback { level: 500 }));
    }
}
