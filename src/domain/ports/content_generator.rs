use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ActionOutcome, AgentAction, ArcSeed, Choice, PlayerState, Situation, WorldContext,
};

/// Input for a new arc seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcSeedRequest {
    pub world: WorldContext,
    pub player: PlayerState,
    /// Titles of arcs that already exist
    pub existing_arcs: Vec<String>,
}

/// Input for the first situation of an arc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootSituationRequest {
    pub world: WorldContext,
    pub player: PlayerState,
    pub arc_id: String,
    pub arc_seed: ArcSeed,
}

/// Input for the situation reached by a dangling choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationRequest {
    /// World context of the tree node that owns the parent situation
    pub world: WorldContext,
    pub player: PlayerState,
    pub arc_id: Option<String>,
    pub arc_seed: Option<ArcSeed>,
    pub parent: Situation,
    pub choice: Choice,
    /// Depth the new situation will sit at
    pub depth: u32,
    /// Ids already taken in the graph
    pub existing_ids: Vec<String>,
    /// Narrative threads currently open
    pub active_threads: Vec<String>,
}

/// Port for the non-deterministic content collaborator
///
/// Implementations wrap whatever produces content (a language model, a
/// scripted fixture). Failures that may succeed on a second attempt must be
/// reported as `DomainError::TransientGenerationFailure`.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn generate_arc_seed(&self, request: &ArcSeedRequest) -> DomainResult<ArcSeed>;

    async fn generate_root_situation(
        &self,
        request: &RootSituationRequest,
    ) -> DomainResult<Situation>;

    async fn generate_situation(&self, request: &SituationRequest) -> DomainResult<Situation>;
}

/// What a decision maker sees before picking the next action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContext {
    pub step: u32,
    pub world: WorldContext,
    pub player: PlayerState,
    pub current_situation: Option<Situation>,
    /// Choice ids from the tree root to the current node
    pub path: Vec<String>,
    /// `(situation_id, choice_id)` pairs still waiting for a destination
    pub dangling_choices: Vec<(String, String)>,
    pub situation_count: usize,
    pub last_outcome: Option<ActionOutcome>,
}

/// Port for the agent that drives generation one action at a time
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn select_action(&self, context: &DecisionContext) -> DomainResult<AgentAction>;
}
