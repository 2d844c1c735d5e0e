//! Deterministic offline content generator.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ArcSeed, Choice, ChoiceCategory, ChoiceEffects, Npc, Situation,
};
use crate::domain::ports::{
    ArcSeedRequest, ContentGenerator, RootSituationRequest, SituationRequest,
};

const CATEGORY_ROTATION: [ChoiceCategory; 6] = [
    ChoiceCategory::Dialogue,
    ChoiceCategory::Action,
    ChoiceCategory::Investigation,
    ChoiceCategory::EmotionalResponse,
    ChoiceCategory::SocialInteraction,
    ChoiceCategory::Movement,
];

const DEFAULT_THEMES: [&str; 2] = ["intrigue", "survival"];

/// Placeholder content with stable ids, for running the pipeline without a
/// model.
///
/// Situations are named `situation_<n>` in request order. Every situation
/// offers `choices_per_situation` dangling choices unless it sits at or
/// beyond the ending depth.
#[derive(Debug)]
pub struct ScriptedGenerator {
    choices_per_situation: usize,
    ending_depth: Option<u32>,
    counter: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(choices_per_situation: usize) -> Self {
        Self {
            choices_per_situation,
            ending_depth: None,
            counter: AtomicUsize::new(0),
        }
    }

    /// Situations at `depth` or deeper are endings without choices.
    pub fn with_ending_depth(mut self, depth: u32) -> Self {
        self.ending_depth = Some(depth);
        self
    }

    fn next_id(&self, taken: &[String]) -> String {
        loop {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("situation_{n}");
            if !taken.contains(&id) {
                return id;
            }
        }
    }

    fn choices_for(&self, situation_id: &str, ordinal: usize) -> Vec<Choice> {
        (0..self.choices_per_situation)
            .map(|k| {
                let category = CATEGORY_ROTATION[(ordinal + k) % CATEGORY_ROTATION.len()];
                let mut choice = Choice::new(
                    format!("option_{}", k + 1),
                    format!("{} option {} from {situation_id}", category.as_str(), k + 1),
                    category,
                );
                // Every first dialogue option introduces a contact.
                if k == 0 && category == ChoiceCategory::Dialogue {
                    choice = choice.with_effects(ChoiceEffects {
                        new_npcs: vec![Npc::new(
                            format!("Contact of {situation_id}"),
                            "Someone met along the way",
                        )],
                        ..ChoiceEffects::default()
                    });
                }
                choice
            })
            .collect()
    }

    fn is_ending_depth(&self, depth: u32) -> bool {
        self.ending_depth.is_some_and(|limit| depth >= limit)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new(2)
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_arc_seed(&self, request: &ArcSeedRequest) -> DomainResult<ArcSeed> {
        let world = &request.world.seed;
        let name = if world.name.trim().is_empty() {
            "Unnamed World"
        } else {
            world.name.as_str()
        };
        let themes: Vec<String> = if world.themes.is_empty() {
            DEFAULT_THEMES.iter().map(ToString::to_string).collect()
        } else {
            world.themes.clone()
        };

        let mut seed = ArcSeed::new(format!(
            "Arc {} of {name}",
            request.existing_arcs.len() + 1
        ))
        .with_theme_tags(themes);
        seed.core_conflict = format!("Who controls {name}?");
        seed.tone = "tense".to_string();
        seed.factions_involved = request
            .world
            .factions
            .iter()
            .map(|f| f.name.clone())
            .collect();
        Ok(seed)
    }

    async fn generate_root_situation(
        &self,
        request: &RootSituationRequest,
    ) -> DomainResult<Situation> {
        let mut root = Situation::new(
            "root",
            format!("The story of {} begins.", request.arc_seed.title),
        )
        .with_tags(request.arc_seed.theme_tags.iter().cloned());
        root.player_perspective_description = "You arrive with nothing but questions.".to_string();
        for choice in self.choices_for("root", 0) {
            root = root.with_choice(choice);
        }
        Ok(root)
    }

    async fn generate_situation(&self, request: &SituationRequest) -> DomainResult<Situation> {
        let id = self.next_id(&request.existing_ids);
        let ordinal = request.existing_ids.len();
        let mut situation = Situation::new(
            id.clone(),
            format!("After choosing \"{}\" the scene shifts.", request.choice.text),
        )
        .with_depth(request.depth)
        .with_tags(
            request
                .parent
                .context_tags
                .iter()
                .cloned()
                .chain(std::iter::once(request.choice.category.as_str().to_string())),
        );
        situation.player_perspective_description = format!("You chose: {}", request.choice.text);

        if self.is_ending_depth(request.depth) {
            situation.is_ending = true;
        } else {
            for choice in self.choices_for(&id, ordinal) {
                situation = situation.with_choice(choice);
            }
        }
        Ok(situation)
    }
}
