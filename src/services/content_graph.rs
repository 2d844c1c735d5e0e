use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Arc, Choice, DuplicateIdPolicy, Situation};

/// Authoritative store of situations, their choices and arcs.
///
/// Situations are kept in insertion order and never removed. A resolved
/// choice always names a situation present in the graph.
#[derive(Debug, Clone, Default)]
pub struct ContentGraph {
    situations: IndexMap<String, Situation>,
    arcs: IndexMap<String, Arc>,
    root_id: Option<String>,
    policy: DuplicateIdPolicy,
}

impl ContentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicateIdPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Rebuild a graph from stored parts, validating every resolved target.
    ///
    /// Later inserts into the rebuilt graph follow `policy`.
    pub fn from_parts(
        situations: impl IntoIterator<Item = Situation>,
        arcs: impl IntoIterator<Item = Arc>,
        root_id: Option<String>,
        policy: DuplicateIdPolicy,
    ) -> DomainResult<Self> {
        let mut graph = Self::with_policy(policy);
        for arc in arcs {
            if graph.arcs.contains_key(&arc.id) {
                return Err(DomainError::DuplicateArc(arc.id));
            }
            graph.arcs.insert(arc.id.clone(), arc);
        }
        for situation in situations {
            if graph.situations.contains_key(&situation.id) {
                return Err(DomainError::DuplicateId(situation.id));
            }
            graph.situations.insert(situation.id.clone(), situation);
        }
        for situation in graph.situations.values() {
            for choice in &situation.choices {
                if let Some(target) = &choice.next_situation_id {
                    if !graph.situations.contains_key(target) {
                        return Err(DomainError::UnknownTarget {
                            choice_id: choice.id.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        if let Some(root) = root_id {
            graph.set_root(&root)?;
        }
        Ok(graph)
    }

    pub fn policy(&self) -> DuplicateIdPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.situations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.situations.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.situations.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Situation> {
        self.situations.get(id)
    }

    /// Position of a situation in insertion order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.situations.get_index_of(id)
    }

    pub fn situations(&self) -> impl Iterator<Item = &Situation> {
        self.situations.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.situations.keys().map(String::as_str)
    }

    pub fn arc(&self, id: &str) -> Option<&Arc> {
        self.arcs.get(id)
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.values()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn set_root(&mut self, id: &str) -> DomainResult<()> {
        if !self.contains(id) {
            return Err(DomainError::SituationNotFound(id.to_string()));
        }
        self.root_id = Some(id.to_string());
        Ok(())
    }

    /// An id derived from `base` that is not taken yet.
    pub fn unique_id(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Insert a situation and return the id it was stored under.
    ///
    /// Under the suffix policy a taken id is renamed; under the reject policy
    /// it fails with `DuplicateId`. Duplicate choice ids are suffixed and
    /// choices targeting unknown situations are reset to dangling.
    pub fn insert(&mut self, mut situation: Situation) -> DomainResult<String> {
        self.check_insertable(&situation.id)?;
        if self.contains(&situation.id) {
            let renamed = self.unique_id(&situation.id);
            warn!(original = %situation.id, renamed = %renamed, "renamed duplicate situation id");
            situation.id = renamed;
        }

        self.repair_choices(&mut situation);

        if let Some(arc_id) = situation.arc_id.clone() {
            match self.arcs.get_mut(&arc_id) {
                Some(arc) => arc.situation_ids.push(situation.id.clone()),
                None => {
                    warn!(situation_id = %situation.id, arc_id = %arc_id, "situation names unknown arc, detaching");
                    situation.arc_id = None;
                }
            }
        }

        let id = situation.id.clone();
        debug!(situation_id = %id, choices = situation.choices.len(), "inserted situation");
        self.situations.insert(id.clone(), situation);
        Ok(id)
    }

    fn repair_choices(&self, situation: &mut Situation) {
        let own_id = situation.id.clone();
        let mut seen: HashSet<String> = HashSet::new();
        for choice in &mut situation.choices {
            if seen.contains(&choice.id) {
                let base = choice.id.clone();
                let mut n = 2;
                while seen.contains(&format!("{base}_{n}")) {
                    n += 1;
                }
                choice.id = format!("{base}_{n}");
                warn!(situation_id = %own_id, original = %base, renamed = %choice.id, "renamed duplicate choice id");
            }
            seen.insert(choice.id.clone());

            if let Some(target) = &choice.next_situation_id {
                if *target != own_id && !self.contains(target) {
                    warn!(
                        situation_id = %own_id,
                        choice_id = %choice.id,
                        target = %target,
                        "choice targets unknown situation, reset to dangling"
                    );
                    choice.next_situation_id = None;
                }
            }
        }
    }

    /// Whether a situation with `id` would be accepted by [`ContentGraph::insert`].
    pub fn check_insertable(&self, id: &str) -> DomainResult<()> {
        if self.policy == DuplicateIdPolicy::Reject && self.contains(id) {
            return Err(DomainError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    /// Point a dangling choice at an existing situation.
    pub fn resolve(&mut self, situation_id: &str, choice_id: &str, target_id: &str) -> DomainResult<()> {
        self.check_resolvable(situation_id, choice_id)?;
        if !self.contains(target_id) {
            return Err(DomainError::UnknownTarget {
                choice_id: choice_id.to_string(),
                target: target_id.to_string(),
            });
        }
        let choice = self
            .situations
            .get_mut(situation_id)
            .and_then(|s| s.choice_mut(choice_id))
            .ok_or_else(|| DomainError::ChoiceNotFound {
                situation_id: situation_id.to_string(),
                choice_id: choice_id.to_string(),
            })?;
        choice.next_situation_id = Some(target_id.to_string());
        debug!(situation_id, choice_id, target_id, "resolved choice");
        Ok(())
    }

    fn check_resolvable(&self, situation_id: &str, choice_id: &str) -> DomainResult<()> {
        let situation = self
            .get(situation_id)
            .ok_or_else(|| DomainError::SituationNotFound(situation_id.to_string()))?;
        let choice = situation
            .choice(choice_id)
            .ok_or_else(|| DomainError::ChoiceNotFound {
                situation_id: situation_id.to_string(),
                choice_id: choice_id.to_string(),
            })?;
        if choice.is_resolved() {
            return Err(DomainError::ChoiceAlreadyResolved {
                situation_id: situation_id.to_string(),
                choice_id: choice_id.to_string(),
            });
        }
        Ok(())
    }

    /// Insert `situation` and resolve `parent_id.choice_id` to it as one step.
    ///
    /// The parent choice is validated first, so on error the graph is unchanged.
    pub fn insert_and_resolve(
        &mut self,
        parent_id: &str,
        choice_id: &str,
        situation: Situation,
    ) -> DomainResult<String> {
        self.check_resolvable(parent_id, choice_id)?;
        let id = self.insert(situation)?;
        self.resolve(parent_id, choice_id, &id)?;
        Ok(id)
    }

    /// Append a choice to a situation and return its (possibly suffixed) id.
    pub fn append_choice(&mut self, situation_id: &str, mut choice: Choice) -> DomainResult<String> {
        if let Some(target) = &choice.next_situation_id {
            if !self.contains(target) {
                return Err(DomainError::UnknownTarget {
                    choice_id: choice.id,
                    target: target.clone(),
                });
            }
        }
        let situation = self
            .situations
            .get_mut(situation_id)
            .ok_or_else(|| DomainError::SituationNotFound(situation_id.to_string()))?;
        if situation.choice(&choice.id).is_some() {
            let base = choice.id.clone();
            let mut n = 2;
            while situation.choice(&format!("{base}_{n}")).is_some() {
                n += 1;
            }
            choice.id = format!("{base}_{n}");
        }
        let id = choice.id.clone();
        situation.choices.push(choice);
        Ok(id)
    }

    pub fn mark_ending(&mut self, situation_id: &str) -> DomainResult<()> {
        let situation = self
            .situations
            .get_mut(situation_id)
            .ok_or_else(|| DomainError::SituationNotFound(situation_id.to_string()))?;
        situation.is_ending = true;
        Ok(())
    }

    pub fn add_arc(&mut self, arc: Arc) -> DomainResult<()> {
        if self.arcs.contains_key(&arc.id) {
            return Err(DomainError::DuplicateArc(arc.id));
        }
        self.arcs.insert(arc.id.clone(), arc);
        Ok(())
    }

    /// An arc id derived from `base` that is not taken yet.
    pub fn unique_arc_id(&self, base: &str) -> String {
        if !self.arcs.contains_key(base) {
            return base.to_string();
        }
        let mut n = 2;
        while self.arcs.contains_key(&format!("{base}_{n}")) {
            n += 1;
        }
        format!("{base}_{n}")
    }

    /// Every `(situation_id, choice_id)` still waiting for a destination.
    pub fn all_dangling_choices(&self) -> Vec<(String, String)> {
        self.situations
            .values()
            .flat_map(|s| s.dangling_choices().map(|c| (s.id.clone(), c.id.clone())))
            .collect()
    }

    /// Resolved destinations of a situation.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.get(id)
            .map(|s| s.next_situations().collect())
            .unwrap_or_default()
    }

    /// Whether every situation of the arc is complete.
    pub fn arc_is_complete(&self, arc_id: &str) -> DomainResult<bool> {
        let arc = self
            .arc(arc_id)
            .ok_or_else(|| DomainError::ArcNotFound(arc_id.to_string()))?;
        Ok(arc
            .situation_ids
            .iter()
            .filter_map(|id| self.get(id))
            .all(Situation::is_complete))
    }
}
