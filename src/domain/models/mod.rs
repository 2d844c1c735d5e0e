pub mod action;
pub mod arc;
pub mod config;
pub mod situation;
pub mod snapshot;
pub mod world;

pub use action::{ActionOutcome, AgentAction, ChoiceSituation};
pub use arc::{Arc, ArcOutcome, ArcSeed};
pub use config::{
    Config, CycleConfig, DuplicateIdPolicy, GenerationConfig, LogFormat, LoggingConfig,
    PriorityConfig, RetryConfig, RotationPolicy, SnapshotConfig,
};
pub use situation::{
    Choice, ChoiceCategory, ChoiceEffects, Comparison, Situation, StatRequirement,
};
pub use snapshot::{ArcSnapshot, DETACHED_ARC_ID, SituationSnapshot, Snapshot};
pub use world::{
    District, Faction, Npc, PlayerAttribute, PlayerState, Technology, WorldContext, WorldSeed,
};
