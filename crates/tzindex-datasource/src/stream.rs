//! Live-push buffering: groups push messages by level before handing them
//! downstream, since a single chain level arrives over the wire as several
//! independent messages.
//!
//! A level is flushed either when the first message of a later level
//! arrives, or when a quiescence timer fires with no new message — whichever
//! comes first. This mirrors the REST fetch's invariant that all operations
//! for a level are delivered together.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use tzindex_core::types::{BigMapDiff, Operation};

use crate::wire::PushMessage;

/// One level's worth of buffered operations/big-map diffs, or a rollback
/// notification, ready for downstream dispatch.
#[derive(Debug, Clone)]
pub enum FlushedEvent {
    Level {
        level: u64,
        operations: Vec<Operation>,
        bigmaps: Vec<BigMapDiff>,
    },
    Rollback {
        level: u64,
    },
}

/// Buffers push messages for the level currently being accumulated.
#[derive(Default)]
pub struct LiveBuffer {
    current_level: Option<u64>,
    operations: Vec<Operation>,
    bigmaps: Vec<BigMapDiff>,
}

impl LiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.current_level.is_none()
    }

    /// Feed one push message in. Returns a flushed event for the
    /// *previously* buffered level if this message starts a new one.
    pub fn push(&mut self, msg: PushMessage) -> Option<FlushedEvent> {
        match msg {
            PushMessage::Operations { level, operations } => self.accumulate(level, |b| {
                b.operations.extend(operations.into_iter().map(Operation::from));
            }),
            PushMessage::BigMaps { level, diffs } => self.accumulate(level, |b| {
                b.bigmaps.extend(diffs.into_iter().map(BigMapDiff::from));
            }),
            PushMessage::Rollback { level } => {
                let flushed = self.flush();
                debug_assert!(flushed.is_none() || matches!(flushed, Some(FlushedEvent::Level { .. })));
                // A rollback message always flushes immediately; any buffered
                // level is necessarily below the rollback target already
                // delivered, so the caller just needs the rollback itself.
                let _ = flushed;
                self.current_level = None;
                return Some(FlushedEvent::Rollback { level });
            }
            PushMessage::Head { .. } => {}
        }
        None
    }

    fn accumulate(&mut self, level: u64, apply: impl FnOnce(&mut Self)) -> Option<FlushedEvent> {
        let flushed = match self.current_level {
            Some(current) if current != level => self.flush(),
            Some(_) => None,
            None => {
                self.current_level = Some(level);
                None
            }
        };
        if self.current_level.is_none() {
            self.current_level = Some(level);
        }
        apply(self);
        flushed
    }

    /// Force-flush whatever is currently buffered (quiescence timeout, or
    /// shutdown).
    pub fn flush(&mut self) -> Option<FlushedEvent> {
        let level = self.current_level.take()?;
        let operations = std::mem::take(&mut self.operations);
        let bigmaps = std::mem::take(&mut self.bigmaps);
        Some(FlushedEvent::Level { level, operations, bigmaps })
    }
}

/// Drives a [`LiveBuffer`] from a broadcast receiver of push messages,
/// flushing on quiescence and forwarding events to `out`. Runs until the
/// receiver lags past recovery or `out` is dropped.
pub async fn run_live(
    mut rx: broadcast::Receiver<PushMessage>,
    quiescence: Duration,
    out: mpsc::Sender<FlushedEvent>,
) {
    let mut buffer = LiveBuffer::new();

    loop {
        let next = tokio::time::timeout(quiescence, rx.recv()).await;
        match next {
            Ok(Ok(msg)) => {
                if let Some(event) = buffer.push(msg) {
                    if out.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(skipped, "live buffer lagged behind datasource, dropping stale messages");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => return,
            Err(_elapsed) => {
                if let Some(event) = buffer.flush() {
                    debug!("quiescence timer fired, flushing buffered level");
                    if out.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{RawBigMapAction, RawBigMapDiff, RawOperation, RawOperationKind};

    fn raw_op(level: u64, counter: u64) -> RawOperation {
        RawOperation {
            hash: "op1".into(),
            counter,
            level,
            timestamp: 0,
            kind: RawOperationKind::Transaction,
            sender: "tz1x".into(),
            target: None,
            amount: 0,
            entrypoint: None,
            parameter: None,
            storage: None,
            originated_contract_type: None,
            index_in_group: 0,
        }
    }

    #[test]
    fn push_does_not_flush_while_level_unchanged() {
        let mut buffer = LiveBuffer::new();
        assert!(buffer.push(PushMessage::Operations { level: 100, operations: vec![raw_op(100, 1)] }).is_none());
        assert!(buffer.push(PushMessage::Operations { level: 100, operations: vec![raw_op(100, 2)] }).is_none());
    }

    #[test]
    fn new_level_flushes_previous_buffer() {
        let mut buffer = LiveBuffer::new();
        buffer.push(PushMessage::Operations { level: 100, operations: vec![raw_op(100, 1)] });
        let flushed = buffer
            .push(PushMessage::Operations { level: 101, operations: vec![raw_op(101, 1)] })
            .expect("should flush level 100");
        match flushed {
            FlushedEvent::Level { level, operations, .. } => {
                assert_eq!(level, 100);
                assert_eq!(operations.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn rollback_flushes_rollback_event_directly() {
        let mut buffer = LiveBuffer::new();
        buffer.push(PushMessage::Operations { level: 100, operations: vec![raw_op(100, 1)] });
        let flushed = buffer.push(PushMessage::Rollback { level: 90 }).unwrap();
        assert!(matches!(flushed, FlushedEvent::Rollback { level: 90 }));
    }

    #[test]
    fn bigmap_diffs_accumulate_with_operations_in_same_level() {
        let mut buffer = LiveBuffer::new();
        buffer.push(PushMessage::Operations { level: 100, operations: vec![raw_op(100, 1)] });
        buffer.push(PushMessage::BigMaps {
            level: 100,
            diffs: vec![RawBigMapDiff {
                big_map_id: 1,
                level: 100,
                index_in_block: 0,
                action: RawBigMapAction::UpdateKey,
                contract: "KT1abc".into(),
                path: "ledger".into(),
                key: None,
                value: None,
            }],
        });
        let flushed = buffer.flush().unwrap();
        match flushed {
            FlushedEvent::Level { operations, bigmaps, .. } => {
                assert_eq!(operations.len(), 1);
                assert_eq!(bigmaps.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
