use serde::{Deserialize, Serialize};

use super::arc::ArcSeed;
use super::situation::{Choice, Situation};
use super::world::{Faction, Npc, Technology};

/// A situation to attach behind one dangling choice of the current situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSituation {
    pub choice_id: String,
    pub situation: Situation,
}

/// One step chosen by a [`DecisionMaker`](crate::domain::ports::DecisionMaker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    CreateNpc { npc: Npc },
    CreateFaction { faction: Faction },
    CreateTechnology { technology: Technology },
    /// Attach a new situation behind `choice_id` of the current situation.
    CreateSituation {
        choice_id: String,
        situation: Situation,
    },
    CreateMultipleSituations { situations: Vec<ChoiceSituation> },
    /// Append choices to the current situation.
    CreateChoices { choices: Vec<Choice> },
    CreateArc { seed: ArcSeed, root: Situation },
    GoToSituation { situation_id: String },
    UpOneLevel,
    /// Move to the child reached by `choice_id`, or the first child.
    DownOneLevel { choice_id: Option<String> },
    GoToArcRoot,
    GoToWorldRoot,
    GetSituationById { situation_id: String },
    FindMissingSituations,
    IdentifyNarrativeGaps,
    Complete,
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateNpc { .. } => "create_npc",
            Self::CreateFaction { .. } => "create_faction",
            Self::CreateTechnology { .. } => "create_technology",
            Self::CreateSituation { .. } => "create_situation",
            Self::CreateMultipleSituations { .. } => "create_multiple_situations",
            Self::CreateChoices { .. } => "create_choices",
            Self::CreateArc { .. } => "create_arc",
            Self::GoToSituation { .. } => "go_to_situation",
            Self::UpOneLevel => "up_one_level",
            Self::DownOneLevel { .. } => "down_one_level",
            Self::GoToArcRoot => "go_to_arc_root",
            Self::GoToWorldRoot => "go_to_world_root",
            Self::GetSituationById { .. } => "get_situation_by_id",
            Self::FindMissingSituations => "find_missing_situations",
            Self::IdentifyNarrativeGaps => "identify_narrative_gaps",
            Self::Complete => "complete",
        }
    }
}

/// What happened when an action was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: String,
    /// True when the graph or a world context changed.
    pub mutated: bool,
    pub message: String,
}

impl ActionOutcome {
    pub fn mutation(action: &AgentAction, message: impl Into<String>) -> Self {
        Self {
            action: action.name().to_string(),
            mutated: true,
            message: message.into(),
        }
    }

    pub fn query(action: &AgentAction, message: impl Into<String>) -> Self {
        Self {
            action: action.name().to_string(),
            mutated: false,
            message: message.into(),
        }
    }
}
