//! Index state machine — tracks one configured index's lifecycle and cursor.

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;

/// Runtime configuration shared by every index kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRuntimeConfig {
    pub name: String,
    pub datasource: String,
    pub first_level: u64,
    /// Bounded indexes stop advancing once they reach this level and move to
    /// `Disabled` instead of `Realtime`.
    pub last_level: Option<u64>,
    pub confirmation_depth: u64,
}

/// Lifecycle status of a configured index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStatus {
    /// Registered but not yet initialised.
    New,
    /// Catching up to the datasource head.
    Syncing,
    /// Following the chain tip; cursor stays within the confirmation window
    /// of head.
    Realtime,
    /// Reversing committed state back to a rollback level.
    Rollback,
    /// A bounded index that has reached its `last_level` and stopped.
    Disabled,
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Syncing => write!(f, "syncing"),
            Self::Realtime => write!(f, "realtime"),
            Self::Rollback => write!(f, "rollback"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// The persisted and in-memory state of one index: its status and cursor.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub config: IndexRuntimeConfig,
    pub status: IndexStatus,
    pub cursor: Cursor,
}

impl IndexState {
    pub fn new(config: IndexRuntimeConfig) -> Self {
        let cursor = Cursor::new(config.first_level, config.confirmation_depth);
        Self {
            config,
            status: IndexStatus::New,
            cursor,
        }
    }

    /// Transition out of `New` once initial state has loaded.
    pub fn mark_initialised(&mut self) {
        debug_assert_eq!(self.status, IndexStatus::New);
        self.status = IndexStatus::Syncing;
    }

    /// Advance the cursor to `level` and transition `Syncing` -> `Realtime`
    /// (or `Disabled`, for a bounded index that just reached its bound) once
    /// the datasource head has been caught up to.
    pub fn commit_level(&mut self, level: u64, head: u64) {
        self.cursor.advance(level);

        if let Some(last_level) = self.config.last_level {
            if level >= last_level {
                self.status = IndexStatus::Disabled;
                return;
            }
        }

        if self.status == IndexStatus::Syncing && self.cursor.is_confirmed(level, head) {
            self.status = IndexStatus::Realtime;
        }
    }

    /// Begin a rollback to `level`. Only valid from `Realtime` or `Syncing`.
    pub fn begin_rollback(&mut self, level: u64) {
        self.status = IndexStatus::Rollback;
        self.cursor.reset(level);
    }

    /// Rollback replay has caught the cursor back up; resume normal sync.
    pub fn finish_rollback(&mut self) {
        debug_assert_eq!(self.status, IndexStatus::Rollback);
        self.status = IndexStatus::Syncing;
    }

    /// `Disabled` indexes are skipped entirely by the dispatch loop.
    pub fn is_active(&self) -> bool {
        self.status != IndexStatus::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(last_level: Option<u64>) -> IndexRuntimeConfig {
        IndexRuntimeConfig {
            name: "test_index".into(),
            datasource: "tzkt_mainnet".into(),
            first_level: 0,
            last_level,
            confirmation_depth: 2,
        }
    }

    #[test]
    fn new_index_starts_new_then_syncing() {
        let mut state = IndexState::new(config(None));
        assert_eq!(state.status, IndexStatus::New);
        state.mark_initialised();
        assert_eq!(state.status, IndexStatus::Syncing);
    }

    #[test]
    fn syncing_transitions_to_realtime_once_confirmed_at_head() {
        let mut state = IndexState::new(config(None));
        state.mark_initialised();
        state.commit_level(98, 100);
        assert_eq!(state.status, IndexStatus::Realtime);
    }

    #[test]
    fn bounded_index_disables_at_last_level() {
        let mut state = IndexState::new(config(Some(50)));
        state.mark_initialised();
        state.commit_level(50, 100);
        assert_eq!(state.status, IndexStatus::Disabled);
        assert!(!state.is_active());
    }

    #[test]
    fn rollback_decreases_cursor_then_resumes_syncing() {
        let mut state = IndexState::new(config(None));
        state.mark_initialised();
        state.commit_level(100, 102);
        state.begin_rollback(90);
        assert_eq!(state.status, IndexStatus::Rollback);
        assert_eq!(state.cursor.level, 90);
        state.finish_rollback();
        assert_eq!(state.status, IndexStatus::Syncing);
    }
}
