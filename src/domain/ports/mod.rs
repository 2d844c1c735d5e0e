//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async interfaces infrastructure adapters implement:
//! - ContentGenerator: produces arc seeds and situations
//! - DecisionMaker: picks the next action in agent-driven generation
//! - SnapshotStore: persists per-step snapshots

pub mod content_generator;
pub mod snapshot_store;

pub use content_generator::{
    ArcSeedRequest, ContentGenerator, DecisionContext, DecisionMaker, RootSituationRequest,
    SituationRequest,
};
pub use snapshot_store::{NullSnapshotStore, SnapshotStore};
