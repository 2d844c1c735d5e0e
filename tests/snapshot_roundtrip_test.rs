//! Snapshot persistence across a complete run
//!
//! Every mutating step writes exactly one file; the last one carries the
//! finalized graph.

mod common;

use std::sync::Arc;

use common::{temp_dir, test_config};
use reforge::domain::models::{WorldContext, WorldSeed};
use reforge::infrastructure::persistence::{
    latest_snapshot, list_snapshots, load_snapshot, resolve_snapshot_path, JsonSnapshotStore,
};
use reforge::services::{GenerationOrchestrator, NeverCycle};
use reforge::ScriptedGenerator;

#[tokio::test]
async fn test_one_snapshot_per_step() {
    let dir = temp_dir();
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(6, 3),
        Arc::new(ScriptedGenerator::new(2)),
        Arc::new(JsonSnapshotStore::in_dir(dir.path())),
        WorldContext::new(WorldSeed::new("Glass Coast")),
    )
    .with_cycle_policy(Box::new(NeverCycle));

    let report = orchestrator.run().await.unwrap();

    let files = list_snapshots(dir.path()).await.unwrap();
    assert_eq!(files.len(), report.generation_step as usize + 1);

    let mut previous = None;
    for file in &files {
        let snapshot = load_snapshot(file).await.unwrap();
        if let Some(step) = previous {
            assert_eq!(snapshot.generation_step, step + 1);
        } else {
            assert_eq!(snapshot.generation_step, 0);
            assert_eq!(snapshot.step_name, "initial_arc");
        }
        previous = Some(snapshot.generation_step);
    }
}

#[tokio::test]
async fn test_latest_snapshot_matches_final_graph() {
    let dir = temp_dir();
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(5, 2),
        Arc::new(ScriptedGenerator::new(2)),
        Arc::new(JsonSnapshotStore::in_dir(dir.path())),
        WorldContext::new(WorldSeed::new("Glass Coast")),
    )
    .with_cycle_policy(Box::new(NeverCycle));
    orchestrator.run().await.unwrap();

    let latest = latest_snapshot(dir.path()).await.unwrap().unwrap();
    assert_eq!(resolve_snapshot_path(dir.path()).await.unwrap(), latest);

    let snapshot = load_snapshot(&latest).await.unwrap();
    assert_eq!(snapshot.step_name, "final_export");
    assert_eq!(snapshot.generation_step, orchestrator.step());
    assert_eq!(snapshot.incomplete_situations_count, 0);
    assert_eq!(snapshot.dead_end_choices_count, 0);

    let restored = snapshot.to_graph().unwrap();
    let live = orchestrator.graph();
    assert_eq!(restored.len(), live.len());
    assert_eq!(restored.root_id(), live.root_id());
    for situation in live.situations() {
        assert_eq!(restored.get(&situation.id), Some(situation));
    }
}
