use chrono::Utc;
use indexmap::IndexMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Arc, ArcSnapshot, DuplicateIdPolicy, PlayerState, Situation, SituationSnapshot, Snapshot,
    DETACHED_ARC_ID,
};
use crate::services::connectivity::ConnectivityAnalyzer;
use crate::services::content_graph::ContentGraph;
use crate::services::state_tree::StateTree;

fn arc_snapshot<'a>(
    id: &str,
    arc: Option<&Arc>,
    situations: impl Iterator<Item = &'a Situation>,
) -> ArcSnapshot {
    let situations: IndexMap<String, SituationSnapshot> = situations
        .map(|s| (s.id.clone(), SituationSnapshot::from(s)))
        .collect();
    let bridge_nodes = situations
        .values()
        .filter(|s| s.is_bridge_node)
        .map(|s| s.situation.id.clone())
        .collect();
    ArcSnapshot {
        id: id.to_string(),
        seed: arc.map(|a| a.seed.clone()),
        outcomes: arc.map(|a| a.outcomes.clone()).unwrap_or_default(),
        situations,
        bridge_nodes,
    }
}

/// Capture the full state of a run at one step.
pub fn capture_snapshot(
    graph: &ContentGraph,
    tree: &StateTree,
    player: &PlayerState,
    generation_step: u32,
    step_name: &str,
) -> Snapshot {
    let analyzer = ConnectivityAnalyzer::new();
    let report = analyzer.report(graph, Some((tree, tree.current())));

    let mut arcs: Vec<ArcSnapshot> = graph
        .arcs()
        .map(|arc| {
            let members = arc.situation_ids.iter().filter_map(|id| graph.get(id));
            arc_snapshot(&arc.id, Some(arc), members)
        })
        .collect();

    let detached: Vec<&Situation> = graph
        .situations()
        .filter(|s| s.arc_id.as_deref().map_or(true, |a| graph.arc(a).is_none()))
        .collect();
    if !detached.is_empty() {
        arcs.push(arc_snapshot(DETACHED_ARC_ID, None, detached.into_iter()));
    }

    let current = tree.current_node();
    Snapshot {
        world_context: current.context.clone(),
        player_state: player.clone(),
        generation_step,
        step_name: step_name.to_string(),
        arcs,
        incomplete_situations_count: report.incomplete_situations,
        dead_end_choices_count: report.dead_end_choices,
        distance_to_complete: report.distance_to_complete,
        root_situation_id: graph.root_id().map(str::to_string),
        current_situation_id: current.situation_id.clone(),
        choice_history: tree.path_to_root(),
        created_at: Utc::now(),
    }
}

impl Snapshot {
    /// Rebuild the content graph this snapshot was taken from.
    pub fn to_graph(&self) -> DomainResult<ContentGraph> {
        self.to_graph_with_policy(DuplicateIdPolicy::default())
    }

    /// Like [`Snapshot::to_graph`], with later inserts following `policy`.
    pub fn to_graph_with_policy(&self, policy: DuplicateIdPolicy) -> DomainResult<ContentGraph> {
        let arcs = self
            .arcs
            .iter()
            .filter(|a| a.id != DETACHED_ARC_ID)
            .map(|a| Arc {
                id: a.id.clone(),
                seed: a.seed.clone().unwrap_or_default(),
                situation_ids: a.situations.keys().cloned().collect(),
                outcomes: a.outcomes.clone(),
            })
            .collect::<Vec<_>>();
        let situations = self.situations().cloned().collect::<Vec<_>>();
        ContentGraph::from_parts(situations, arcs, self.root_situation_id.clone(), policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ArcSeed, Choice, ChoiceCategory, WorldContext, WorldSeed};
    use crate::services::state_tree::StateTreeNode;

    fn create_test_state() -> (ContentGraph, StateTree) {
        let mut graph = ContentGraph::new();
        graph.add_arc(Arc::new("arc_1", ArcSeed::new("Arrival"))).unwrap();
        graph
            .insert(
                Situation::new("root", "Start")
                    .in_arc("arc_1")
                    .with_choice(Choice::new("call_for_help", "Call for help", ChoiceCategory::Dialogue))
                    .with_choice(Choice::new("run", "Run", ChoiceCategory::Action)),
            )
            .unwrap();
        graph.set_root("root").unwrap();
        let mut bridge = Situation::new("bridge_1", "Crossroads");
        bridge.bridgeable = true;
        graph.insert(bridge).unwrap();
        graph.resolve("root", "run", "bridge_1").unwrap();

        let tree = StateTree::new(StateTreeNode::new(
            WorldContext::new(WorldSeed::new("w")),
            Some("root".into()),
            Some("arc_1".into()),
            0,
        ));
        (graph, tree)
    }

    #[test]
    fn test_capture_groups_by_arc() {
        let (graph, tree) = create_test_state();
        let snapshot = capture_snapshot(&graph, &tree, &PlayerState::new("p"), 3, "situation_3");

        assert_eq!(snapshot.generation_step, 3);
        assert_eq!(snapshot.arcs.len(), 2);
        assert_eq!(snapshot.arcs[0].id, "arc_1");
        assert_eq!(snapshot.arcs[1].id, DETACHED_ARC_ID);
        assert_eq!(snapshot.arcs[1].bridge_nodes, vec!["bridge_1"]);
        assert_eq!(snapshot.incomplete_situations_count, 1);
        assert_eq!(snapshot.dead_end_choices_count, 1);
        assert_eq!(
            snapshot.arcs[0].situations["root"].next_situations,
            vec!["bridge_1"]
        );
    }

    #[test]
    fn test_to_graph_round_trip() {
        let (graph, tree) = create_test_state();
        let snapshot = capture_snapshot(&graph, &tree, &PlayerState::new("p"), 0, "initial_arc");
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        let rebuilt = parsed.to_graph().unwrap();

        assert_eq!(rebuilt.len(), graph.len());
        assert_eq!(rebuilt.root_id(), Some("root"));
        for situation in graph.situations() {
            assert_eq!(rebuilt.get(&situation.id), Some(situation));
        }
        assert_eq!(rebuilt.arc("arc_1").unwrap().situation_ids, vec!["root"]);
    }

    #[test]
    fn test_to_graph_with_reject_policy() {
        let (graph, tree) = create_test_state();
        let snapshot = capture_snapshot(&graph, &tree, &PlayerState::new("p"), 0, "initial_arc");

        let mut rebuilt = snapshot.to_graph_with_policy(DuplicateIdPolicy::Reject).unwrap();
        assert_eq!(rebuilt.policy(), DuplicateIdPolicy::Reject);
        assert!(rebuilt.insert(Situation::new("root", "Again")).is_err());

        let mut lenient = snapshot.to_graph().unwrap();
        assert_eq!(lenient.insert(Situation::new("root", "Again")).unwrap(), "root_2");
    }
}
