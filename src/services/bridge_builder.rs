use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Choice, ChoiceCategory, Situation};
use crate::services::connectivity::ConnectivityAnalyzer;
use crate::services::content_graph::ContentGraph;

/// Groups at or above this size get a synthesized bridge situation.
const BRIDGE_SITUATION_THRESHOLD: usize = 3;

/// One choice added or resolved by the bridge builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEdge {
    pub situation_id: String,
    pub choice_id: String,
    pub target: String,
}

/// Everything one bridging pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeReport {
    pub dangling_resolved: Vec<BridgeEdge>,
    pub direct_bridges: Vec<BridgeEdge>,
    pub bridge_situations: Vec<String>,
    pub forced_bridges: Vec<BridgeEdge>,
}

impl BridgeReport {
    pub fn is_empty(&self) -> bool {
        self.dangling_resolved.is_empty()
            && self.direct_bridges.is_empty()
            && self.bridge_situations.is_empty()
            && self.forced_bridges.is_empty()
    }

    pub fn merge(&mut self, other: BridgeReport) {
        self.dangling_resolved.extend(other.dangling_resolved);
        self.direct_bridges.extend(other.direct_bridges);
        self.bridge_situations.extend(other.bridge_situations);
        self.forced_bridges.extend(other.forced_bridges);
    }
}

/// Resolves leftover dangling choices and restores reachability from the root
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeBuilder {
    analyzer: ConnectivityAnalyzer,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best existing destination for a dangling choice on `from`.
    ///
    /// Prefers shared tags, then endings, then depth; ties go to the earliest
    /// situation. `from` itself is used only when it is alone in the graph.
    fn best_target(graph: &ContentGraph, from: &Situation) -> Option<String> {
        if graph.len() == 1 {
            return Some(from.id.clone());
        }
        let mut best: Option<(&str, (usize, bool, u32))> = None;
        for candidate in graph.situations().filter(|s| s.id != from.id) {
            let score = (
                from.shared_tag_count(candidate),
                candidate.is_ending,
                candidate.generation_depth,
            );
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate.id.as_str(), score));
            }
        }
        best.map(|(id, _)| id.to_string())
    }

    /// Point every dangling choice at an existing situation.
    pub fn resolve_dangling(&self, graph: &mut ContentGraph) -> DomainResult<Vec<BridgeEdge>> {
        let mut resolved = Vec::new();
        for (situation_id, choice_id) in graph.all_dangling_choices() {
            let Some(from) = graph.get(&situation_id) else {
                continue;
            };
            let Some(target) = Self::best_target(graph, from) else {
                continue;
            };
            graph.resolve(&situation_id, &choice_id, &target)?;
            debug!(situation_id = %situation_id, choice_id = %choice_id, target = %target, "resolved dangling choice");
            resolved.push(BridgeEdge {
                situation_id,
                choice_id,
                target,
            });
        }
        if !resolved.is_empty() {
            info!(count = resolved.len(), "resolved dangling choices");
        }
        Ok(resolved)
    }

    /// One representative per unreachable region, in insertion order.
    fn entry_points(&self, graph: &ContentGraph, unreachable: &[String]) -> Vec<String> {
        let mut covered: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();
        for id in unreachable {
            if covered.contains(id) {
                continue;
            }
            entries.push(id.clone());
            for reached in self.analyzer.reachable_set(graph, id) {
                covered.insert(reached.to_string());
            }
        }
        entries
    }

    /// Reachable situation best suited to lead into `target`.
    fn best_source(graph: &ContentGraph, reachable: &HashSet<&str>, target: &Situation) -> Option<String> {
        let mut best: Option<(&str, (usize, bool, bool))> = None;
        for source in graph.situations().filter(|s| reachable.contains(s.id.as_str())) {
            let score = (
                source.shared_tag_count(target),
                source.arc_id != target.arc_id,
                !source.is_ending,
            );
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((source.id.as_str(), score));
            }
        }
        best.map(|(id, _)| id.to_string())
    }

    fn bridge_choice(graph: &ContentGraph, target: &str) -> Choice {
        let text = graph
            .get(target)
            .map(|s| format!("Head toward: {}", s.description))
            .unwrap_or_else(|| format!("Head toward {target}"));
        Choice::new(format!("bridge_to_{target}"), text, ChoiceCategory::Movement)
            .with_target(target)
    }

    /// Reconnect every situation the root cannot reach.
    ///
    /// Entry points are grouped by their best reachable source. Small groups
    /// get direct choices; larger ones get one bridge situation fanning out.
    /// Anything still unreachable is linked straight from the root.
    pub fn build_bridges(&self, graph: &mut ContentGraph) -> DomainResult<BridgeReport> {
        let mut report = BridgeReport::default();
        let Some(root) = graph.root_id().map(str::to_string) else {
            return Ok(report);
        };

        let unreachable = self.analyzer.reachable_from_root(graph, &root);
        if unreachable.is_empty() {
            return Ok(report);
        }
        let entries = self.entry_points(graph, &unreachable);

        let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
        {
            let reachable = self.analyzer.reachable_set(graph, &root);
            for entry in &entries {
                let Some(target) = graph.get(entry) else {
                    continue;
                };
                if let Some(source) = Self::best_source(graph, &reachable, target) {
                    groups.entry(source).or_default().push(entry.clone());
                }
            }
        }

        for (source, targets) in groups {
            if targets.len() < BRIDGE_SITUATION_THRESHOLD {
                for target in targets {
                    let choice = Self::bridge_choice(graph, &target);
                    let choice_id = graph.append_choice(&source, choice)?;
                    report.direct_bridges.push(BridgeEdge {
                        situation_id: source.clone(),
                        choice_id,
                        target,
                    });
                }
            } else {
                let bridge_id = self.insert_bridge_situation(graph, &source, &targets)?;
                let choice = Self::bridge_choice(graph, &bridge_id);
                let choice_id = graph.append_choice(&source, choice)?;
                report.direct_bridges.push(BridgeEdge {
                    situation_id: source.clone(),
                    choice_id,
                    target: bridge_id.clone(),
                });
                report.bridge_situations.push(bridge_id);
            }
        }

        for orphan in self.analyzer.reachable_from_root(graph, &root) {
            let choice = Self::bridge_choice(graph, &orphan);
            let choice_id = graph.append_choice(&root, choice)?;
            report.forced_bridges.push(BridgeEdge {
                situation_id: root.clone(),
                choice_id,
                target: orphan,
            });
        }

        info!(
            direct = report.direct_bridges.len(),
            bridge_situations = report.bridge_situations.len(),
            forced = report.forced_bridges.len(),
            "bridging complete"
        );
        Ok(report)
    }

    fn insert_bridge_situation(
        &self,
        graph: &mut ContentGraph,
        source: &str,
        targets: &[String],
    ) -> DomainResult<String> {
        let (depth, arc_id) = graph
            .get(source)
            .map(|s| (s.generation_depth + 1, s.arc_id.clone()))
            .unwrap_or_default();
        let mut tags: Vec<String> = Vec::new();
        for target in targets.iter().filter_map(|t| graph.get(t)) {
            for tag in &target.context_tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        let bridge_id = graph.unique_id(&format!("bridge_{source}"));
        let mut bridge = Situation::new(bridge_id, "Several paths open up from here.")
        .with_depth(depth)
        .with_tags(tags);
        bridge.bridgeable = true;
        bridge.arc_id = arc_id;
        for target in targets {
            bridge = bridge.with_choice(Self::bridge_choice(graph, target));
        }
        graph.insert(bridge)
    }

    /// Resolve dangling choices, then bridge. Returns the combined report.
    pub fn repair(&self, graph: &mut ContentGraph) -> DomainResult<BridgeReport> {
        let dangling_resolved = self.resolve_dangling(graph)?;
        let mut report = self.build_bridges(graph)?;
        report.dangling_resolved = dangling_resolved;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn situation(id: &str, tags: &[&str]) -> Situation {
        Situation::new(id, format!("{id} description")).with_tags(tags.iter().copied())
    }

    fn create_rooted_graph() -> ContentGraph {
        let mut graph = ContentGraph::new();
        graph.insert(situation("root", &["city"])).unwrap();
        graph.set_root("root").unwrap();
        graph
    }

    #[test]
    fn test_resolve_dangling_prefers_shared_tags() {
        let mut graph = create_rooted_graph();
        graph
            .insert(situation("from", &["docks"]).with_choice(Choice::new("go", "Go", ChoiceCategory::Movement)))
            .unwrap();
        graph.insert(situation("pier", &["docks"])).unwrap();
        graph.insert(situation("tower", &[]).with_depth(5)).unwrap();

        let resolved = BridgeBuilder::new().resolve_dangling(&mut graph).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].target, "pier");
        assert!(graph.all_dangling_choices().is_empty());
    }

    #[test]
    fn test_single_situation_resolves_to_itself() {
        let mut graph = ContentGraph::new();
        graph
            .insert(situation("only", &[]).with_choice(Choice::new("wait", "Wait", ChoiceCategory::Other)))
            .unwrap();
        let resolved = BridgeBuilder::new().resolve_dangling(&mut graph).unwrap();
        assert_eq!(resolved[0].target, "only");
    }

    #[test]
    fn test_direct_bridges_for_small_groups() {
        let mut graph = create_rooted_graph();
        graph.insert(situation("island", &["city"])).unwrap();

        let report = BridgeBuilder::new().build_bridges(&mut graph).unwrap();
        assert_eq!(report.direct_bridges.len(), 1);
        assert!(report.bridge_situations.is_empty());
        assert!(ConnectivityAnalyzer::new().reachable_from_root(&graph, "root").is_empty());
    }

    #[test]
    fn test_bridge_situation_for_large_groups() {
        let mut graph = create_rooted_graph();
        for id in ["i1", "i2", "i3"] {
            graph.insert(situation(id, &["city"])).unwrap();
        }

        let report = BridgeBuilder::new().build_bridges(&mut graph).unwrap();
        assert_eq!(report.bridge_situations.len(), 1);
        let bridge = graph.get(&report.bridge_situations[0]).unwrap();
        assert!(bridge.bridgeable);
        assert_eq!(bridge.choices.len(), 3);
        assert!(ConnectivityAnalyzer::new().reachable_from_root(&graph, "root").is_empty());
    }

    #[test]
    fn test_unreachable_chain_bridged_once() {
        let mut graph = create_rooted_graph();
        graph
            .insert(situation("head", &[]).with_choice(Choice::new("on", "On", ChoiceCategory::Movement)))
            .unwrap();
        graph.insert(situation("tail", &[])).unwrap();
        graph.resolve("head", "on", "tail").unwrap();

        let report = BridgeBuilder::new().build_bridges(&mut graph).unwrap();
        assert_eq!(report.direct_bridges.len(), 1);
        assert_eq!(report.direct_bridges[0].target, "head");
        assert!(report.forced_bridges.is_empty());
    }

    #[test]
    fn test_repair_leaves_clean_graph() {
        let mut graph = create_rooted_graph();
        graph
            .insert(situation("a", &[]).with_choice(Choice::new("x", "X", ChoiceCategory::Action)))
            .unwrap();
        graph.insert(situation("b", &[])).unwrap();

        let report = BridgeBuilder::new().repair(&mut graph).unwrap();
        assert!(!report.is_empty());
        assert!(graph.all_dangling_choices().is_empty());
        assert!(ConnectivityAnalyzer::new().reachable_from_root(&graph, "root").is_empty());
    }

    #[test]
    fn test_no_root_is_noop() {
        let mut graph = ContentGraph::new();
        graph.insert(situation("a", &[])).unwrap();
        let report = BridgeBuilder::new().build_bridges(&mut graph).unwrap();
        assert!(report.is_empty());
    }
}
