//! The argument shapes handlers and hooks are invoked with.

use tzindex_core::types::{BigMapDiff, Operation};

/// What a handler callback is invoked with — one bound operation per
/// pattern item for operation handlers, or the triggering diff for big-map
/// handlers.
#[derive(Debug, Clone)]
pub enum HandlerPayload {
    Operations(Vec<Operation>),
    BigMap(BigMapDiff),
}

impl HandlerPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::Operations(ops) => ops.len(),
            Self::BigMap(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
