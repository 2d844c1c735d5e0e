use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::situation::ChoiceEffects;

/// High-level description a world is generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub name: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub high_concept: String,
}

impl WorldSeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Filesystem-safe form of the seed name.
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        if slug.is_empty() {
            "world".to_string()
        } else {
            slug
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ideology: String,
    #[serde(default)]
    pub influence_level: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub factions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub controlling_faction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub faction: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
}

impl Npc {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Setting entities visible at one state tree node.
///
/// Nodes never share a context; children get a clone with their additions
/// appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldContext {
    pub seed: WorldSeed,
    #[serde(default)]
    pub factions: Vec<Faction>,
    #[serde(default)]
    pub technologies: Vec<Technology>,
    #[serde(default)]
    pub districts: Vec<District>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub tension_sliders: IndexMap<String, i32>,
    #[serde(default)]
    pub world_root: Option<String>,
}

impl WorldContext {
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn entity_count(&self) -> usize {
        self.factions.len() + self.technologies.len() + self.districts.len() + self.npcs.len()
    }

    /// Clone with the entities introduced by `effects` appended.
    pub fn with_additions(&self, effects: &ChoiceEffects) -> Self {
        let mut next = self.clone();
        next.npcs.extend(effects.new_npcs.iter().cloned());
        next.factions.extend(effects.new_factions.iter().cloned());
        next.technologies
            .extend(effects.new_technologies.iter().cloned());
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAttribute {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// The player profile used to evaluate stat requirements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub name: String,
    #[serde(default)]
    pub stats: IndexMap<String, i64>,
    #[serde(default)]
    pub attributes: Vec<PlayerAttribute>,
    #[serde(default)]
    pub history: Vec<String>,
}

impl PlayerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A player with every core stat at `value`.
    pub fn with_uniform_stats(name: impl Into<String>, value: i64) -> Self {
        const CORE_STATS: [&str; 6] = ["might", "insight", "nimbleness", "savvy", "tenacity", "allure"];
        let mut player = Self::new(name);
        for stat in CORE_STATS {
            player.stats.insert(stat.to_string(), value);
        }
        player
    }
}
