//! Rollback handling: reacting to an explicit rollback notification from the
//! datasource, and a sliding window of buffered-but-uncommitted levels that
//! can be discarded without a round trip to storage.

use std::collections::VecDeque;

use crate::state::IndexState;

/// A rollback notification carrying the level the datasource has
/// reorganised back to. Every index with a cursor past this level must
/// reverse its own effects before resuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackEvent {
    pub level: u64,
}

/// Returns the names of indexes whose cursor is ahead of the rollback level.
pub fn affected_indexes<'a>(
    states: impl IntoIterator<Item = &'a IndexState>,
    event: RollbackEvent,
) -> Vec<String> {
    states
        .into_iter()
        .filter(|s| s.cursor.level > event.level)
        .map(|s| s.config.name.clone())
        .collect()
}

/// Tracks the levels an index has buffered operations for but not yet
/// committed. On rollback, levels above the rollback point are discarded
/// from the window so the matcher does not try to re-emit them once the
/// datasource replays from the lower level.
pub struct LevelWindow {
    window: VecDeque<u64>,
    window_size: usize,
}

impl LevelWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Record that `level` has been buffered. Levels must arrive in
    /// non-decreasing order; the oldest entry is evicted once the window is
    /// full.
    pub fn push(&mut self, level: u64) {
        if self.window.back().copied() == Some(level) {
            return;
        }
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(level);
    }

    pub fn head(&self) -> Option<u64> {
        self.window.back().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Discard every buffered level greater than `level`.
    pub fn rewind_to(&mut self, level: u64) {
        while let Some(&back) = self.window.back() {
            if back > level {
                self.window.pop_back();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{IndexRuntimeConfig, IndexState};

    fn state(name: &str, cursor_level: u64) -> IndexState {
        let mut s = IndexState::new(IndexRuntimeConfig {
            name: name.into(),
            datasource: "tzkt_mainnet".into(),
            first_level: 0,
            last_level: None,
            confirmation_depth: 2,
        });
        s.mark_initialised();
        s.commit_level(cursor_level, cursor_level + 100);
        s
    }

    #[test]
    fn affected_indexes_filters_by_cursor() {
        let behind = state("behind", 40);
        let ahead = state("ahead", 60);
        let states = vec![&behind, &ahead];
        let affected = affected_indexes(states, RollbackEvent { level: 50 });
        assert_eq!(affected, vec!["ahead".to_string()]);
    }

    #[test]
    fn window_push_and_rewind() {
        let mut window = LevelWindow::new(10);
        for level in 100..=105 {
            window.push(level);
        }
        assert_eq!(window.head(), Some(105));
        window.rewind_to(102);
        assert_eq!(window.head(), Some(102));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn window_size_enforced() {
        let mut window = LevelWindow::new(3);
        for level in 0..10 {
            window.push(level);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.head(), Some(9));
    }

    #[test]
    fn window_push_deduplicates_repeated_level() {
        let mut window = LevelWindow::new(3);
        window.push(5);
        window.push(5);
        assert_eq!(window.len(), 1);
    }
}
