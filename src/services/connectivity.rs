use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::domain::models::{Choice, Situation};
use crate::services::content_graph::ContentGraph;
use crate::services::state_tree::{NodeId, StateTree};

/// Distance reported when no complete situation can be reached.
pub const UNREACHABLE_DISTANCE: usize = 999_999;

/// Diagnostic counters for one point in generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub incomplete_situations: usize,
    pub dead_end_choices: usize,
    pub distance_to_complete: usize,
    pub unreachable: Vec<String>,
}

/// Read-only analyses over the content graph and state tree
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityAnalyzer;

impl ConnectivityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn node_is_complete(graph: &ContentGraph, tree: &StateTree, node: NodeId) -> bool {
        tree.node(node)
            .ok()
            .and_then(|n| n.situation_id.as_deref())
            .and_then(|id| graph.get(id))
            .is_some_and(Situation::is_complete)
    }

    /// Tree hops from `start` to the nearest node whose situation is complete.
    ///
    /// Walks parent and child edges breadth-first. Returns
    /// [`UNREACHABLE_DISTANCE`] when no such node exists.
    pub fn distance_to_completion(&self, graph: &ContentGraph, tree: &StateTree, start: NodeId) -> usize {
        if tree.node(start).is_err() {
            return UNREACHABLE_DISTANCE;
        }
        let mut visited: HashSet<NodeId> = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0_usize)]);

        while let Some((node, distance)) = queue.pop_front() {
            if Self::node_is_complete(graph, tree, node) {
                return distance;
            }
            let Ok(current) = tree.node(node) else {
                continue;
            };
            let neighbours = current
                .parent
                .into_iter()
                .chain(current.children.values().copied());
            for next in neighbours {
                if visited.insert(next) {
                    queue.push_back((next, distance + 1));
                }
            }
        }
        UNREACHABLE_DISTANCE
    }

    /// Choice hops from `situation_id` to the nearest complete situation,
    /// following resolved choices. Terminates on cycles.
    pub fn graph_distance_to_completion(&self, graph: &ContentGraph, situation_id: &str) -> usize {
        if !graph.contains(situation_id) {
            return UNREACHABLE_DISTANCE;
        }
        let mut visited: HashSet<&str> = HashSet::from([situation_id]);
        let mut queue = VecDeque::from([(situation_id, 0_usize)]);

        while let Some((id, distance)) = queue.pop_front() {
            let Some(situation) = graph.get(id) else {
                continue;
            };
            if situation.is_complete() {
                return distance;
            }
            for next in situation.next_situations() {
                if visited.insert(next) {
                    queue.push_back((next, distance + 1));
                }
            }
        }
        UNREACHABLE_DISTANCE
    }

    pub fn dangling_choices_for<'a>(&self, situation: &'a Situation) -> Vec<&'a Choice> {
        situation.dangling_choices().collect()
    }

    pub fn all_incomplete_situations<'a>(&self, graph: &'a ContentGraph) -> Vec<&'a Situation> {
        graph.situations().filter(|s| !s.is_complete()).collect()
    }

    /// Number of dangling choices in the whole graph.
    pub fn dead_end_count(&self, graph: &ContentGraph) -> usize {
        graph
            .situations()
            .map(|s| s.dangling_choices().count())
            .sum()
    }

    /// Ids reachable from `root_id` over resolved choices, root included.
    pub fn reachable_set<'a>(&self, graph: &'a ContentGraph, root_id: &str) -> HashSet<&'a str> {
        let mut reached = HashSet::new();
        let Some(root) = graph.get(root_id).map(|s| s.id.as_str()) else {
            return reached;
        };
        reached.insert(root);
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            for next in graph.successors(id) {
                if reached.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        reached
    }

    /// Reachability check from the root: returns every situation it cannot
    /// reach, in graph insertion order.
    pub fn reachable_from_root(&self, graph: &ContentGraph, root_id: &str) -> Vec<String> {
        let reached = self.reachable_set(graph, root_id);
        graph
            .ids()
            .filter(|id| !reached.contains(id))
            .map(str::to_string)
            .collect()
    }

    /// All counters at once. Distance is measured from `node` when a tree is
    /// given, otherwise over the graph from its root.
    pub fn report(&self, graph: &ContentGraph, tree: Option<(&StateTree, NodeId)>) -> ConnectivityReport {
        let distance_to_complete = match (tree, graph.root_id()) {
            (Some((tree, node)), _) => self.distance_to_completion(graph, tree, node),
            (None, Some(root)) => self.graph_distance_to_completion(graph, root),
            (None, None) => UNREACHABLE_DISTANCE,
        };
        let unreachable = graph
            .root_id()
            .map(|root| self.reachable_from_root(graph, root))
            .unwrap_or_default();

        ConnectivityReport {
            incomplete_situations: self.all_incomplete_situations(graph).len(),
            dead_end_choices: self.dead_end_count(graph),
            distance_to_complete,
            unreachable,
        }
    }
}
