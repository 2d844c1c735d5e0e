use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::domain::models::{Choice, ChoiceCategory, PlayerState, PriorityConfig, Situation};

/// Service for calculating the expansion priority of dangling choices
///
/// Priority formula:
/// category_weight - depth * depth_penalty
///   + thread_urgency_bonus * (parent tags found in active threads)
///   - requirement_penalty * (unmet requirements)
#[derive(Debug, Clone)]
pub struct ChoicePriorityCalculator {
    depth_penalty: f64,
    requirement_penalty: f64,
    thread_urgency_bonus: f64,
    category_weights: IndexMap<String, f64>,
}

impl Default for ChoicePriorityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChoicePriorityCalculator {
    /// Create a new priority calculator with default weights
    pub fn new() -> Self {
        Self::from_config(&PriorityConfig::default())
    }

    /// Create a priority calculator with custom penalties and default category weights
    pub fn with_weights(depth_penalty: f64, requirement_penalty: f64, thread_urgency_bonus: f64) -> Self {
        Self {
            depth_penalty,
            requirement_penalty,
            thread_urgency_bonus,
            category_weights: PriorityConfig::default().category_weights,
        }
    }

    pub fn from_config(config: &PriorityConfig) -> Self {
        Self {
            depth_penalty: config.depth_penalty,
            requirement_penalty: config.requirement_penalty,
            thread_urgency_bonus: config.thread_urgency_bonus,
            category_weights: config.category_weights.clone(),
        }
    }

    /// Base weight of a category; 1.0 when not configured
    pub fn category_weight(&self, category: ChoiceCategory) -> f64 {
        self.category_weights
            .get(category.as_str())
            .copied()
            .unwrap_or(1.0)
    }

    /// Calculate the priority of `choice` on `parent`
    ///
    /// # Arguments
    /// * `parent` - Situation owning the choice; its depth and tags are used
    /// * `choice` - The dangling choice
    /// * `player` - Player whose stats decide unmet requirements
    /// * `active_threads` - Narrative threads currently open
    pub fn calculate(
        &self,
        parent: &Situation,
        choice: &Choice,
        player: &PlayerState,
        active_threads: &[String],
    ) -> f64 {
        let base = self.category_weight(choice.category);
        let depth = f64::from(parent.generation_depth) * self.depth_penalty;
        let urgent_tags = parent
            .context_tags
            .iter()
            .filter(|tag| active_threads.contains(tag))
            .count();
        let urgency = urgent_tags as f64 * self.thread_urgency_bonus;
        let unmet = choice.unmet_requirements(player) as f64 * self.requirement_penalty;

        base - depth + urgency - unmet
    }
}

/// A dangling choice waiting in the expansion queue.
#[derive(Debug, Clone)]
pub struct PendingChoice {
    pub situation_id: String,
    pub choice_id: String,
    /// Depth of the owning situation
    pub depth: u32,
    pub priority: f64,
    sequence: u64,
}

impl PartialEq for PendingChoice {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingChoice {}

impl PartialOrd for PendingChoice {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingChoice {
    // Higher priority first, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Max-priority queue of dangling choices with FIFO tie-breaking
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<PendingChoice>,
    queued: HashSet<(String, String)>,
    next_sequence: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a choice. Returns false if it is already queued.
    pub fn push(&mut self, situation_id: &str, choice_id: &str, depth: u32, priority: f64) -> bool {
        let key = (situation_id.to_string(), choice_id.to_string());
        if !self.queued.insert(key) {
            return false;
        }
        self.heap.push(PendingChoice {
            situation_id: situation_id.to_string(),
            choice_id: choice_id.to_string(),
            depth,
            priority,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        true
    }

    pub fn pop(&mut self) -> Option<PendingChoice> {
        let next = self.heap.pop()?;
        self.queued
            .remove(&(next.situation_id.clone(), next.choice_id.clone()));
        Some(next)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, situation_id: &str, choice_id: &str) -> bool {
        self.queued
            .contains(&(situation_id.to_string(), choice_id.to_string()))
    }
}
