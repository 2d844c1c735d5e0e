use serde::{Deserialize, Serialize};

/// Thematic metadata an arc is generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcSeed {
    pub title: String,
    #[serde(default)]
    pub core_conflict: String,
    #[serde(default)]
    pub theme_tags: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub factions_involved: Vec<String>,
}

impl ArcSeed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_theme_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.theme_tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// A possible resolution of an arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcOutcome {
    pub id: String,
    pub description: String,
}

/// A named grouping of situations sharing seed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    pub id: String,
    pub seed: ArcSeed,
    #[serde(default)]
    pub situation_ids: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<ArcOutcome>,
}

impl Arc {
    pub fn new(id: impl Into<String>, seed: ArcSeed) -> Self {
        Self {
            id: id.into(),
            seed,
            situation_ids: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// First situation of the arc, if any.
    pub fn root_situation(&self) -> Option<&str> {
        self.situation_ids.first().map(String::as_str)
    }
}
