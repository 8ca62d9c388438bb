//! Operation cache and matcher: reassembles operation groups and matches
//! them against every registered operation index's declared handler
//! patterns.

use std::collections::HashMap;

use crate::types::{BigMapDiff, BigMapHandlerConfig, GroupKey, HandlerConfig, Operation, OperationGroup};

/// A completed match: the owning index, the handler whose pattern matched,
/// and the operations bound to each pattern item in order.
#[derive(Debug, Clone)]
pub struct Match {
    pub index_name: String,
    pub handler: HandlerConfig,
    pub matched_operations: Vec<Operation>,
}

/// Buffers in-flight operation groups per registered operation index and
/// matches completed groups against each index's declared handlers.
pub struct OperationCache {
    indexes: HashMap<String, Vec<HandlerConfig>>,
    buckets: HashMap<GroupKey, OperationGroup>,
    /// Order buckets were first touched in, so `process` can iterate
    /// completed groups in arrival order.
    bucket_order: Vec<GroupKey>,
}

impl OperationCache {
    pub fn new() -> Self {
        Self {
            indexes: HashMap::new(),
            buckets: HashMap::new(),
            bucket_order: Vec::new(),
        }
    }

    /// Register an operation index's handlers. Idempotent for the same name.
    pub fn add_index(&mut self, index_name: impl Into<String>, handlers: Vec<HandlerConfig>) {
        self.indexes.insert(index_name.into(), handlers);
    }

    /// Buffer an operation into its group.
    pub fn add(&mut self, op: Operation) {
        let key = GroupKey {
            hash: op.hash.clone(),
            counter: op.counter,
        };
        if !self.buckets.contains_key(&key) {
            self.bucket_order.push(key.clone());
        }
        self.buckets.entry(key).or_default().push(op);
    }

    /// Mark every currently-buffered group as complete and match them
    /// against every registered index, in (level, counter) arrival order.
    /// Returns the matches found and drops the matched/exhausted groups.
    pub fn process(&mut self) -> Vec<Match> {
        let mut matches = Vec::new();

        let keys = std::mem::take(&mut self.bucket_order);
        for key in keys {
            let Some(group) = self.buckets.remove(&key) else {
                continue;
            };
            for (index_name, handlers) in &self.indexes {
                if let Some((handler, matched_operations)) = match_handlers(handlers, &group) {
                    matches.push(Match {
                        index_name: index_name.clone(),
                        handler,
                        matched_operations,
                    });
                }
            }
        }

        matches.sort_by_key(|m| {
            m.matched_operations
                .first()
                .map(|op| (op.level, op.counter))
                .unwrap_or((0, 0))
        });
        matches
    }

    pub fn pending_groups(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for OperationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A completed big-map match: the owning index, the handler whose
/// (contract, path) pair matched, and the triggering diff.
#[derive(Debug, Clone)]
pub struct BigMapMatch {
    pub index_name: String,
    pub handler: BigMapHandlerConfig,
    pub diff: BigMapDiff,
}

/// Matches incoming big-map diffs directly against every registered big-map
/// index's declared (contract, path) pairs. Unlike [`OperationCache`], there
/// is no buffering or grouping: each diff is matched and dispatched as soon
/// as it arrives.
#[derive(Default)]
pub struct BigMapMatcher {
    indexes: HashMap<String, Vec<BigMapHandlerConfig>>,
}

impl BigMapMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a big-map index's handlers. Idempotent for the same name.
    pub fn add_index(&mut self, index_name: impl Into<String>, handlers: Vec<BigMapHandlerConfig>) {
        self.indexes.insert(index_name.into(), handlers);
    }

    /// Match one diff against every registered index's handlers, in handler
    /// declaration order. A diff may match more than one handler across
    /// different indexes, but only the first matching handler within a
    /// given index.
    pub fn match_diff(&self, diff: &BigMapDiff) -> Vec<BigMapMatch> {
        let mut matches = Vec::new();
        for (index_name, handlers) in &self.indexes {
            for handler in handlers {
                if handler.contract == diff.contract && handler.path == diff.path {
                    matches.push(BigMapMatch {
                        index_name: index_name.clone(),
                        handler: handler.clone(),
                        diff: diff.clone(),
                    });
                    break;
                }
            }
        }
        matches
    }
}

/// Try every handler in declaration order against `group`; the first one
/// whose pattern fully matches wins.
fn match_handlers(
    handlers: &[HandlerConfig],
    group: &OperationGroup,
) -> Option<(HandlerConfig, Vec<Operation>)> {
    for handler in handlers {
        if let Some(matched) = match_pattern(&handler.pattern, &group.operations) {
            return Some((handler.clone(), matched));
        }
    }
    None
}

/// Greedy left-to-right pattern match: each pattern item claims the first
/// unmatched operation at or after the moving cursor that satisfies it.
fn match_pattern(
    pattern: &[crate::types::PatternItem],
    operations: &[Operation],
) -> Option<Vec<Operation>> {
    if pattern.len() > operations.len() {
        return None;
    }

    let mut matched = Vec::with_capacity(pattern.len());
    let mut cursor = 0usize;

    for item in pattern {
        let found = operations[cursor..].iter().position(|op| op.matches(item))?;
        let absolute = cursor + found;
        matched.push(operations[absolute].clone());
        cursor = absolute + 1;
    }

    Some(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationKind, PatternItem};

    fn op(hash: &str, counter: u64, idx: u32, entrypoint: &str) -> Operation {
        Operation {
            hash: hash.into(),
            counter,
            level: 100,
            timestamp: 1000,
            kind: OperationKind::Transaction,
            sender_address: "tz1sender".into(),
            target_address: Some("KT1contract".into()),
            amount: 0,
            entrypoint: Some(entrypoint.into()),
            parameter: None,
            storage: None,
            originated_contract_type: None,
            index_in_group: idx,
        }
    }

    fn handler(name: &str, entrypoints: &[&str]) -> HandlerConfig {
        HandlerConfig {
            callback: name.into(),
            pattern: entrypoints
                .iter()
                .map(|e| PatternItem::new(OperationKind::Transaction).entrypoint(*e))
                .collect(),
        }
    }

    #[test]
    fn empty_group_yields_no_emissions() {
        let mut cache = OperationCache::new();
        cache.add_index("idx", vec![handler("on_mint", &["mint"])]);
        assert!(cache.process().is_empty());
    }

    #[test]
    fn single_item_pattern_matches_single_operation() {
        let mut cache = OperationCache::new();
        cache.add_index("idx", vec![handler("on_mint", &["mint"])]);
        cache.add(op("oph1", 1, 0, "mint"));
        let matches = cache.process();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_operations.len(), 1);
        assert_eq!(matches[0].handler.callback, "on_mint");
    }

    #[test]
    fn multi_item_pattern_binds_one_operation_per_item() {
        let mut cache = OperationCache::new();
        cache.add_index("idx", vec![handler("on_auction", &["initial_auction", "create_auction"])]);
        cache.add(op("oph1", 1, 0, "initial_auction"));
        cache.add(op("oph1", 1, 1, "create_auction"));
        let matches = cache.process();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_operations.len(), 2);
        assert_eq!(matches[0].matched_operations[0].entrypoint.as_deref(), Some("initial_auction"));
        assert_eq!(matches[0].matched_operations[1].entrypoint.as_deref(), Some("create_auction"));
    }

    #[test]
    fn pattern_longer_than_group_never_matches() {
        let mut cache = OperationCache::new();
        cache.add_index("idx", vec![handler("on_pair", &["a", "b", "c"])]);
        cache.add(op("oph1", 1, 0, "a"));
        cache.add(op("oph1", 1, 1, "b"));
        assert!(cache.process().is_empty());
    }

    #[test]
    fn first_matching_handler_in_declaration_order_wins() {
        let mut cache = OperationCache::new();
        cache.add_index(
            "idx",
            vec![handler("specific", &["mint"]), handler("catch_all", &["mint"])],
        );
        cache.add(op("oph1", 1, 0, "mint"));
        let matches = cache.process();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].handler.callback, "specific");
    }

    #[test]
    fn matcher_is_deterministic_across_runs_on_same_group() {
        let handlers = vec![handler("on_mint", &["mint"])];
        let mut group = OperationGroup::default();
        group.push(op("oph1", 1, 0, "mint"));

        let first = match_handlers(&handlers, &group);
        let second = match_handlers(&handlers, &group);
        assert_eq!(
            first.map(|(_, ops)| ops),
            second.map(|(_, ops)| ops)
        );
    }

    fn bigmap_diff(contract: &str, path: &str) -> crate::types::BigMapDiff {
        crate::types::BigMapDiff {
            big_map_id: 1,
            level: 100,
            index_in_block: 0,
            action: crate::types::BigMapAction::UpdateKey,
            contract: contract.into(),
            path: path.into(),
            key: None,
            value: None,
        }
    }

    fn bigmap_handler(name: &str, contract: &str, path: &str) -> BigMapHandlerConfig {
        BigMapHandlerConfig {
            callback: name.into(),
            contract: contract.into(),
            path: path.into(),
        }
    }

    #[test]
    fn bigmap_matcher_matches_on_contract_and_path() {
        let mut matcher = BigMapMatcher::new();
        matcher.add_index("ledger_idx", vec![bigmap_handler("on_ledger", "KT1abc", "ledger")]);

        let matches = matcher.match_diff(&bigmap_diff("KT1abc", "ledger"));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index_name, "ledger_idx");
        assert_eq!(matches[0].handler.callback, "on_ledger");
    }

    #[test]
    fn bigmap_matcher_ignores_diff_for_unregistered_path() {
        let mut matcher = BigMapMatcher::new();
        matcher.add_index("ledger_idx", vec![bigmap_handler("on_ledger", "KT1abc", "ledger")]);

        assert!(matcher.match_diff(&bigmap_diff("KT1abc", "metadata")).is_empty());
        assert!(matcher.match_diff(&bigmap_diff("KT1other", "ledger")).is_empty());
    }

    #[test]
    fn bigmap_matcher_dispatches_to_every_index_that_matches() {
        let mut matcher = BigMapMatcher::new();
        matcher.add_index("ledger_idx", vec![bigmap_handler("on_ledger", "KT1abc", "ledger")]);
        matcher.add_index("audit_idx", vec![bigmap_handler("on_audit", "KT1abc", "ledger")]);

        let matches = matcher.match_diff(&bigmap_diff("KT1abc", "ledger"));
        assert_eq!(matches.len(), 2);
    }
}
