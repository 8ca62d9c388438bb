//! Index cursor — tracks an index's current position in the chain.

use serde::{Deserialize, Serialize};

/// An index's current position in the chain: the last level it has fully
/// committed, plus the confirmation depth it waits for before treating a
/// level as final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    /// Last level whose commit unit has been persisted.
    pub level: u64,
    /// Number of levels behind head required before a level is considered
    /// confirmed (safe from reorg without a rollback notice).
    pub confirmation_depth: u64,
}

impl Cursor {
    pub fn new(level: u64, confirmation_depth: u64) -> Self {
        Self {
            level,
            confirmation_depth,
        }
    }

    /// Advance the cursor to a newly committed level.
    ///
    /// # Panics
    /// Panics if `level` is less than the current level; callers must route
    /// decreases through [`Cursor::reset`], which is the only entry point
    /// permitted during a rollback.
    pub fn advance(&mut self, level: u64) {
        assert!(
            level >= self.level,
            "cursor must not decrease outside of a rollback"
        );
        self.level = level;
    }

    /// Reset the cursor to an earlier level. Only valid while the owning
    /// index is in the `ROLLBACK` state.
    pub fn reset(&mut self, level: u64) {
        self.level = level;
    }

    /// Returns `true` if `target` is far enough behind `head` to be confirmed.
    pub fn is_confirmed(&self, target: u64, head: u64) -> bool {
        head.saturating_sub(target) >= self.confirmation_depth
    }

    /// The next level this index should request from the datasource.
    pub fn next_level(&self) -> u64 {
        self.level + 1
    }
}
