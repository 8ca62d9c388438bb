//! tzindex-engine — the per-index orchestration loop: backfill, transition to
//! realtime, and rollback replay, driven by a datasource and dispatching into
//! registered callbacks.

pub mod bigmap_engine;
pub mod builder;
pub mod engine;

pub use bigmap_engine::BigMapIndexEngine;
pub use builder::{BigMapIndexEngineBuilder, IndexEngineBuilder};
pub use engine::{EngineOutcome, IndexEngine};
