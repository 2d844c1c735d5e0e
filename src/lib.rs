//! Reforge - incremental branching-narrative content graph generator
//!
//! Reforge grows a graph of situations and choices one generation step at a
//! time, tracks world context along a navigation tree, and repairs the graph
//! so that every choice leads somewhere and every situation is reachable.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the generator/store ports
//! - **Service Layer** (`services`): Graph storage, analysis, repair and orchestration
//! - **Infrastructure Layer** (`infrastructure`): Config, logging, persistence, adapters
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reforge::{Config, GenerationOrchestrator, JsonSnapshotStore, ScriptedGenerator};
//! use reforge::domain::models::{WorldContext, WorldSeed};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let seed = WorldSeed::new("Neon Harbor");
//!     let store = Arc::new(JsonSnapshotStore::new("saves", &seed));
//!     let mut orchestrator = GenerationOrchestrator::new(
//!         Config::default(),
//!         Arc::new(ScriptedGenerator::new(2)),
//!         store,
//!         WorldContext::new(seed),
//!     );
//!     let report = orchestrator.run().await?;
//!     println!("{} situations", report.situation_count);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AgentAction, ArcSeed, Choice, ChoiceCategory, Config, PlayerState, Situation, Snapshot,
    WorldContext, WorldSeed,
};
pub use domain::ports::{ContentGenerator, DecisionMaker, SnapshotStore};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::generators::ScriptedGenerator;
pub use infrastructure::persistence::JsonSnapshotStore;
pub use services::{
    BridgeBuilder, ConnectivityAnalyzer, ContentGraph, CycleManager, GenerationOrchestrator,
    GenerationReport, RetryMetricsWrapper, StateTree,
};
