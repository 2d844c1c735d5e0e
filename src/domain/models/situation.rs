use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::world::{Faction, Npc, PlayerState, Technology};

/// Broad category of a choice, used for prioritization and cycle eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceCategory {
    Dialogue,
    Action,
    Investigation,
    EmotionalResponse,
    SocialInteraction,
    Movement,
    Other,
}

impl ChoiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue",
            Self::Action => "action",
            Self::Investigation => "investigation",
            Self::EmotionalResponse => "emotional_response",
            Self::SocialInteraction => "social_interaction",
            Self::Movement => "movement",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ChoiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a stat predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    pub fn evaluate(self, actual: i64, expected: i64) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Lt => actual < expected,
            Self::Gt => actual > expected,
            Self::Le => actual <= expected,
            Self::Ge => actual >= expected,
        }
    }
}

/// A predicate over a player stat, e.g. `might >= 12`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRequirement {
    pub stat: String,
    pub comparison: Comparison,
    pub value: i64,
}

impl StatRequirement {
    pub fn new(stat: impl Into<String>, comparison: Comparison, value: i64) -> Self {
        Self {
            stat: stat.into(),
            comparison,
            value,
        }
    }

    /// Evaluate against the player. Unknown stats read as zero.
    pub fn is_met(&self, player: &PlayerState) -> bool {
        let actual = player.stats.get(&self.stat).copied().unwrap_or(0);
        self.comparison.evaluate(actual, self.value)
    }
}

/// Consequences of taking a choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEffects {
    #[serde(default)]
    pub stat_changes: IndexMap<String, i64>,
    #[serde(default)]
    pub attributes_gained: Vec<String>,
    #[serde(default)]
    pub attributes_lost: Vec<String>,
    #[serde(default)]
    pub new_npcs: Vec<Npc>,
    #[serde(default)]
    pub new_factions: Vec<Faction>,
    #[serde(default)]
    pub new_technologies: Vec<Technology>,
}

impl ChoiceEffects {
    pub fn is_empty(&self) -> bool {
        self.stat_changes.is_empty()
            && self.attributes_gained.is_empty()
            && self.attributes_lost.is_empty()
            && self.new_npcs.is_empty()
            && self.new_factions.is_empty()
            && self.new_technologies.is_empty()
    }

    /// Number of world entities this choice introduces.
    pub fn entity_count(&self) -> usize {
        self.new_npcs.len() + self.new_factions.len() + self.new_technologies.len()
    }
}

/// An outgoing edge of a situation.
///
/// `next_situation_id == None` means the choice is dangling: its destination
/// has not been generated yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
    pub category: ChoiceCategory,
    #[serde(default)]
    pub requirements: Vec<StatRequirement>,
    #[serde(default)]
    pub next_situation_id: Option<String>,
    #[serde(default)]
    pub effects: ChoiceEffects,
}

impl Choice {
    pub fn new(id: impl Into<String>, text: impl Into<String>, category: ChoiceCategory) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category,
            requirements: Vec::new(),
            next_situation_id: None,
            effects: ChoiceEffects::default(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.next_situation_id = Some(target.into());
        self
    }

    pub fn with_requirement(mut self, requirement: StatRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_effects(mut self, effects: ChoiceEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.next_situation_id.is_some()
    }

    pub fn is_dangling(&self) -> bool {
        self.next_situation_id.is_none()
    }

    /// Count requirements the player does not currently satisfy.
    pub fn unmet_requirements(&self, player: &PlayerState) -> usize {
        self.requirements.iter().filter(|r| !r.is_met(player)).count()
    }
}

/// A node of the content graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub player_perspective_description: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub stat_requirements: Vec<StatRequirement>,
    #[serde(default)]
    pub generation_depth: u32,
    #[serde(default)]
    pub bridgeable: bool,
    #[serde(default)]
    pub is_ending: bool,
    #[serde(default)]
    pub context_tags: Vec<String>,
    #[serde(default)]
    pub arc_id: Option<String>,
}

impl Situation {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            id: id.into(),
            player_perspective_description: description.clone(),
            description,
            choices: Vec::new(),
            stat_requirements: Vec::new(),
            generation_depth: 0,
            bridgeable: false,
            is_ending: false,
            context_tags: Vec::new(),
            arc_id: None,
        }
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.generation_depth = depth;
        self
    }

    pub fn in_arc(mut self, arc_id: impl Into<String>) -> Self {
        self.arc_id = Some(arc_id.into());
        self
    }

    /// Complete iff every choice is resolved. Vacuously true without choices.
    pub fn is_complete(&self) -> bool {
        self.choices.iter().all(Choice::is_resolved)
    }

    pub fn dangling_choices(&self) -> impl Iterator<Item = &Choice> {
        self.choices.iter().filter(|c| c.is_dangling())
    }

    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }

    pub fn choice_mut(&mut self, choice_id: &str) -> Option<&mut Choice> {
        self.choices.iter_mut().find(|c| c.id == choice_id)
    }

    /// Resolved destinations, in choice order.
    pub fn next_situations(&self) -> impl Iterator<Item = &str> {
        self.choices
            .iter()
            .filter_map(|c| c.next_situation_id.as_deref())
    }

    pub fn shared_tag_count(&self, other: &Situation) -> usize {
        self.context_tags
            .iter()
            .filter(|t| other.context_tags.contains(t))
            .count()
    }
}
