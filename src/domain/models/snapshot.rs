use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::arc::{ArcOutcome, ArcSeed};
use super::situation::Situation;
use super::world::{PlayerState, WorldContext};

/// Pseudo-arc holding situations that belong to no arc.
pub const DETACHED_ARC_ID: &str = "detached";

/// A situation as written to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationSnapshot {
    #[serde(flatten)]
    pub situation: Situation,
    pub is_bridge_node: bool,
    /// Resolved destinations, in choice order.
    pub next_situations: Vec<String>,
}

impl From<&Situation> for SituationSnapshot {
    fn from(situation: &Situation) -> Self {
        Self {
            is_bridge_node: situation.bridgeable,
            next_situations: situation.next_situations().map(str::to_string).collect(),
            situation: situation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcSnapshot {
    pub id: String,
    /// Absent for the detached pseudo-arc.
    #[serde(default)]
    pub seed: Option<ArcSeed>,
    #[serde(default)]
    pub outcomes: Vec<ArcOutcome>,
    pub situations: IndexMap<String, SituationSnapshot>,
    pub bridge_nodes: Vec<String>,
}

/// One persisted generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub world_context: WorldContext,
    pub player_state: PlayerState,
    pub generation_step: u32,
    pub step_name: String,
    pub arcs: Vec<ArcSnapshot>,
    pub incomplete_situations_count: usize,
    pub dead_end_choices_count: usize,
    pub distance_to_complete: usize,
    #[serde(default)]
    pub root_situation_id: Option<String>,
    #[serde(default)]
    pub current_situation_id: Option<String>,
    #[serde(default)]
    pub choice_history: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn situation_count(&self) -> usize {
        self.arcs.iter().map(|a| a.situations.len()).sum()
    }

    pub fn situations(&self) -> impl Iterator<Item = &Situation> {
        self.arcs
            .iter()
            .flat_map(|a| a.situations.values().map(|s| &s.situation))
    }
}
