//! Core services operating on the content graph
//!
//! - ContentGraph and StateTree: authoritative storage and navigation history
//! - RetryMetricsWrapper: bounded retries around generation calls
//! - ConnectivityAnalyzer, CycleManager and BridgeBuilder: structural guarantees
//! - GenerationOrchestrator: the lifecycle driving everything else

pub mod bridge_builder;
pub mod connectivity;
pub mod content_graph;
pub mod cycle_manager;
pub mod orchestrator;
pub mod priority_calculator;
pub mod report;
pub mod retry;
pub mod snapshot;
pub mod state_tree;

pub use bridge_builder::{BridgeBuilder, BridgeEdge, BridgeReport};
pub use connectivity::{ConnectivityAnalyzer, ConnectivityReport, UNREACHABLE_DISTANCE};
pub use content_graph::ContentGraph;
pub use cycle_manager::{
    AlwaysCycle, CycleCandidate, CycleManager, CyclePolicy, NeverCycle, ProbabilisticCyclePolicy,
    SoftLock,
};
pub use orchestrator::{CancellationHandle, GenerationOrchestrator, OrchestratorState, StepOutcome};
pub use priority_calculator::{ChoicePriorityCalculator, PendingChoice, PendingQueue};
pub use report::{FailureRecord, GenerationReport, GenerationSummary, StopReason};
pub use retry::{
    Acceptable, AttemptMetrics, AttemptOutcome, GenerationMetrics, GenerationOutcome,
    RetryMetricsWrapper,
};
pub use snapshot::capture_snapshot;
pub use state_tree::{NodeId, StateTree, StateTreeNode};
