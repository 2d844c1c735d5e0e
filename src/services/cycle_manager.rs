use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Choice, ChoiceCategory, CycleConfig};
use crate::services::content_graph::ContentGraph;

/// A strongly connected group of situations from which no goal is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLock {
    /// Members in graph insertion order
    pub members: Vec<String>,
}

/// A dangling choice that passed every eligibility check for looping back.
#[derive(Debug, Clone)]
pub struct CycleCandidate<'a> {
    pub parent_id: &'a str,
    pub choice_id: &'a str,
    pub category: ChoiceCategory,
    pub depth: u32,
    pub candidate_count: usize,
}

/// Decides whether an eligible choice loops back instead of generating.
pub trait CyclePolicy: Send + Sync + Debug {
    fn should_cycle(&mut self, candidate: &CycleCandidate<'_>) -> bool;
}

/// Fires with a fixed probability from a seedable RNG.
#[derive(Debug)]
pub struct ProbabilisticCyclePolicy {
    probability: f64,
    rng: StdRng,
}

impl ProbabilisticCyclePolicy {
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl CyclePolicy for ProbabilisticCyclePolicy {
    fn should_cycle(&mut self, _candidate: &CycleCandidate<'_>) -> bool {
        self.rng.gen_bool(self.probability)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCycle;

impl CyclePolicy for NeverCycle {
    fn should_cycle(&mut self, _candidate: &CycleCandidate<'_>) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCycle;

impl CyclePolicy for AlwaysCycle {
    fn should_cycle(&mut self, _candidate: &CycleCandidate<'_>) -> bool {
        true
    }
}

/// Soft-lock detection and resolution, plus beneficial cycle injection
#[derive(Debug)]
pub struct CycleManager {
    config: CycleConfig,
    policy: Box<dyn CyclePolicy>,
}

impl CycleManager {
    pub fn new(config: CycleConfig) -> Self {
        let policy = ProbabilisticCyclePolicy::new(config.probability, config.seed);
        Self {
            config,
            policy: Box::new(policy),
        }
    }

    pub fn with_policy(config: CycleConfig, policy: Box<dyn CyclePolicy>) -> Self {
        Self { config, policy }
    }

    fn resolved_graph(graph: &ContentGraph) -> DiGraphMap<&str, ()> {
        let mut digraph = DiGraphMap::new();
        for situation in graph.situations() {
            digraph.add_node(situation.id.as_str());
        }
        for situation in graph.situations() {
            for next in situation.next_situations() {
                digraph.add_edge(situation.id.as_str(), next, ());
            }
        }
        digraph
    }

    /// Whether no resolved edge leaves `component` and none of its members
    /// is an ending or a situation without choices.
    fn is_closed(graph: &ContentGraph, digraph: &DiGraphMap<&str, ()>, component: &[&str]) -> bool {
        let members: HashSet<&str> = component.iter().copied().collect();
        let leaves = component.iter().any(|id| {
            digraph
                .neighbors_directed(*id, Direction::Outgoing)
                .any(|next| !members.contains(next))
        });
        let finishes = component
            .iter()
            .filter_map(|id| graph.get(id))
            .any(|s| s.is_ending || s.choices.is_empty());
        !leaves && !finishes
    }

    /// Non-trivial strongly connected components with no way out.
    ///
    /// Only sink components qualify; a cycle with an edge into another
    /// component is left alone even if that component is itself locked.
    pub fn detect_soft_locks(&self, graph: &ContentGraph) -> Vec<SoftLock> {
        let digraph = Self::resolved_graph(graph);

        let mut locks: Vec<SoftLock> = tarjan_scc(&digraph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|id| digraph.contains_edge(*id, *id))
            })
            .filter(|component| Self::is_closed(graph, &digraph, component))
            .map(|component| {
                let mut members: Vec<&str> = component;
                members.sort_by_key(|id| graph.index_of(id).unwrap_or(usize::MAX));
                SoftLock {
                    members: members.into_iter().map(str::to_string).collect(),
                }
            })
            .collect();

        locks.sort_by_key(|lock| {
            lock.members
                .first()
                .and_then(|id| graph.index_of(id))
                .unwrap_or(usize::MAX)
        });
        locks
    }

    /// Mark the deepest member of each soft-lock as an ending.
    ///
    /// Ties go to the member inserted first. Returns the marked ids.
    pub fn resolve_soft_locks(&self, graph: &mut ContentGraph) -> DomainResult<Vec<String>> {
        let locks = self.detect_soft_locks(graph);
        let mut marked = Vec::with_capacity(locks.len());
        for lock in locks {
            let mut deepest: Option<(&str, u32)> = None;
            for id in &lock.members {
                let depth = graph.get(id).map_or(0, |s| s.generation_depth);
                if deepest.map_or(true, |(_, best)| depth > best) {
                    deepest = Some((id.as_str(), depth));
                }
            }
            if let Some((id, depth)) = deepest {
                info!(situation_id = id, depth, members = lock.members.len(), "resolving soft-lock");
                let id = id.to_string();
                graph.mark_ending(&id)?;
                marked.push(id);
            }
        }
        Ok(marked)
    }

    /// Decide whether `choice` on `parent_id` should loop back to an earlier
    /// situation, and if so which one.
    ///
    /// `visited` lists situations in the order they were visited.
    pub fn maybe_inject_cycle(
        &mut self,
        graph: &ContentGraph,
        parent_id: &str,
        choice: &Choice,
        visited: &[String],
    ) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let parent = graph.get(parent_id)?;
        if parent.generation_depth < self.config.min_depth
            || !self.config.allowed_categories.contains(&choice.category)
            || graph.len() < self.config.min_generated
        {
            return None;
        }

        let candidates: Vec<&str> = visited
            .iter()
            .map(String::as_str)
            .filter(|id| *id != parent_id && graph.contains(id))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let candidate = CycleCandidate {
            parent_id,
            choice_id: &choice.id,
            category: choice.category,
            depth: parent.generation_depth,
            candidate_count: candidates.len(),
        };
        if !self.policy.should_cycle(&candidate) {
            return None;
        }

        let mut best: Option<(&str, usize)> = None;
        for id in candidates {
            let shared = graph.get(id).map_or(0, |s| parent.shared_tag_count(s));
            if best.map_or(true, |(_, score)| shared >= score) {
                best = Some((id, shared));
            }
        }
        let target = best.map(|(id, _)| id.to_string())?;
        debug!(parent_id, choice_id = %choice.id, target = %target, "injecting beneficial cycle");
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Situation;

    fn create_test_graph(edges: &[(&str, &str)], nodes: &[&str]) -> ContentGraph {
        let mut graph = ContentGraph::new();
        for id in nodes {
            let mut situation = Situation::new(*id, *id);
            for (i, (from, _)) in edges.iter().enumerate() {
                if from == id {
                    situation = situation.with_choice(Choice::new(format!("c{i}"), "", ChoiceCategory::Movement));
                }
            }
            graph.insert(situation).unwrap();
        }
        for (i, (from, to)) in edges.iter().enumerate() {
            graph.resolve(from, &format!("c{i}"), to).unwrap();
        }
        graph
    }

    fn eligible_config() -> CycleConfig {
        CycleConfig {
            min_depth: 1,
            min_generated: 2,
            ..CycleConfig::default()
        }
    }

    #[test]
    fn test_detects_closed_loop() {
        let graph = create_test_graph(&[("a", "b"), ("b", "c"), ("c", "b")], &["a", "b", "c"]);
        let manager = CycleManager::new(CycleConfig::default());
        let locks = manager.detect_soft_locks(&graph);
        assert_eq!(locks, vec![SoftLock { members: vec!["b".into(), "c".into()] }]);
    }

    #[test]
    fn test_loop_with_exit_is_not_a_lock() {
        let graph = create_test_graph(
            &[("a", "b"), ("b", "c"), ("c", "b"), ("c", "end")],
            &["a", "b", "c", "end"],
        );
        let manager = CycleManager::new(CycleConfig::default());
        assert!(manager.detect_soft_locks(&graph).is_empty());
    }

    #[test]
    fn test_upstream_cycle_not_marked() {
        let mut graph = create_test_graph(
            &[("root", "a"), ("a", "b"), ("b", "a"), ("b", "c"), ("c", "d"), ("d", "c")],
            &["root", "a", "b", "c", "d"],
        );
        let manager = CycleManager::new(CycleConfig::default());
        assert_eq!(
            manager.detect_soft_locks(&graph),
            vec![SoftLock { members: vec!["c".into(), "d".into()] }]
        );

        let marked = manager.resolve_soft_locks(&mut graph).unwrap();
        assert_eq!(marked.len(), 1);
        assert!(marked[0] == "c" || marked[0] == "d");
        assert!(!graph.get("a").unwrap().is_ending);
        assert!(!graph.get("b").unwrap().is_ending);
        assert!(manager.detect_soft_locks(&graph).is_empty());
    }

    #[test]
    fn test_self_loop_is_a_lock() {
        let graph = create_test_graph(&[("a", "a")], &["a"]);
        let manager = CycleManager::new(CycleConfig::default());
        assert_eq!(manager.detect_soft_locks(&graph).len(), 1);
    }

    #[test]
    fn test_resolve_marks_deepest_member() {
        let mut graph = ContentGraph::new();
        graph
            .insert(Situation::new("b", "").with_depth(1).with_choice(Choice::new("x", "", ChoiceCategory::Action)))
            .unwrap();
        graph
            .insert(Situation::new("c", "").with_depth(2).with_choice(Choice::new("y", "", ChoiceCategory::Action)))
            .unwrap();
        graph.resolve("b", "x", "c").unwrap();
        graph.resolve("c", "y", "b").unwrap();

        let manager = CycleManager::new(CycleConfig::default());
        let marked = manager.resolve_soft_locks(&mut graph).unwrap();
        assert_eq!(marked, vec!["c"]);
        assert!(graph.get("c").unwrap().is_ending);
        assert!(manager.detect_soft_locks(&graph).is_empty());
    }

    #[test]
    fn test_injection_eligibility() {
        let mut graph = ContentGraph::new();
        graph.insert(Situation::new("old", "").with_tags(["docks"])).unwrap();
        graph
            .insert(Situation::new("parent", "").with_depth(1).with_tags(["docks"]))
            .unwrap();
        let visited = vec!["old".to_string(), "parent".to_string()];
        let social = Choice::new("talk", "", ChoiceCategory::SocialInteraction);
        let action = Choice::new("hit", "", ChoiceCategory::Action);

        let mut manager = CycleManager::with_policy(eligible_config(), Box::new(AlwaysCycle));
        assert_eq!(manager.maybe_inject_cycle(&graph, "parent", &social, &visited), Some("old".into()));
        assert_eq!(manager.maybe_inject_cycle(&graph, "parent", &action, &visited), None);
        assert_eq!(manager.maybe_inject_cycle(&graph, "parent", &social, &["parent".into()]), None);

        let mut never = CycleManager::with_policy(eligible_config(), Box::new(NeverCycle));
        assert_eq!(never.maybe_inject_cycle(&graph, "parent", &social, &visited), None);

        let disabled = CycleConfig {
            enabled: false,
            ..eligible_config()
        };
        let mut off = CycleManager::with_policy(disabled, Box::new(AlwaysCycle));
        assert_eq!(off.maybe_inject_cycle(&graph, "parent", &social, &visited), None);
    }

    #[test]
    fn test_injection_prefers_shared_tags_then_recency() {
        let mut graph = ContentGraph::new();
        graph.insert(Situation::new("tagged", "").with_tags(["heist"])).unwrap();
        graph.insert(Situation::new("plain_1", "")).unwrap();
        graph.insert(Situation::new("plain_2", "")).unwrap();
        graph
            .insert(Situation::new("parent", "").with_depth(3).with_tags(["heist"]))
            .unwrap();
        let choice = Choice::new("ask", "", ChoiceCategory::Investigation);
        let mut manager = CycleManager::with_policy(eligible_config(), Box::new(AlwaysCycle));

        let visited: Vec<String> = ["tagged", "plain_1", "plain_2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(manager.maybe_inject_cycle(&graph, "parent", &choice, &visited), Some("tagged".into()));

        let untagged: Vec<String> = ["plain_1", "plain_2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(manager.maybe_inject_cycle(&graph, "parent", &choice, &untagged), Some("plain_2".into()));
    }

    #[test]
    fn test_seeded_policy_is_repeatable() {
        let candidate = CycleCandidate {
            parent_id: "p",
            choice_id: "c",
            category: ChoiceCategory::Investigation,
            depth: 2,
            candidate_count: 1,
        };
        let mut a = ProbabilisticCyclePolicy::new(0.5, Some(7));
        let mut b = ProbabilisticCyclePolicy::new(0.5, Some(7));
        let first: Vec<bool> = (0..32).map(|_| a.should_cycle(&candidate)).collect();
        let second: Vec<bool> = (0..32).map(|_| b.should_cycle(&candidate)).collect();
        assert_eq!(first, second);

        let mut zero = ProbabilisticCyclePolicy::new(0.0, Some(1));
        assert!(!(0..32).any(|_| zero.should_cycle(&candidate)));
    }
}
