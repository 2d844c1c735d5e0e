//! Integration tests for the generation orchestrator
//!
//! Drives complete runs through the public API with scripted collaborators
//! and checks the lifecycle, retry, repair and persistence behavior.

mod common;

use std::sync::Arc;

use common::{
    setup_test_logging, temp_dir, test_config, FlakyGenerator, ScenarioGenerator, ScriptedAgent,
};
use reforge::domain::models::{
    AgentAction, Choice, ChoiceCategory, Npc, Situation, WorldContext, WorldSeed,
};
use reforge::domain::ports::NullSnapshotStore;
use reforge::infrastructure::persistence::{list_snapshots, load_snapshot, JsonSnapshotStore};
use reforge::services::{
    AlwaysCycle, GenerationOrchestrator, NeverCycle, OrchestratorState, StepOutcome, StopReason,
};
use reforge::ScriptedGenerator;

fn world() -> WorldContext {
    WorldContext::new(WorldSeed::new("Neon Harbor"))
}

#[tokio::test]
async fn test_first_expansion_follows_dialogue_choice() {
    setup_test_logging();
    let dir = temp_dir();
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(10, 2),
        Arc::new(ScenarioGenerator::default()),
        Arc::new(JsonSnapshotStore::in_dir(dir.path())),
        world(),
    )
    .with_cycle_policy(Box::new(NeverCycle));

    orchestrator.initialize().await.unwrap();
    assert_eq!(orchestrator.step(), 0);

    let outcomes = orchestrator.expand_step().await.unwrap();
    assert_eq!(
        outcomes,
        vec![StepOutcome::Expanded {
            situation_id: "situation_1".to_string()
        }]
    );
    assert_eq!(orchestrator.step(), 1);

    let root = orchestrator.graph().get("root").unwrap();
    let call = root.choice("call_for_help").unwrap();
    assert_eq!(call.next_situation_id.as_deref(), Some("situation_1"));
    assert!(root.choice("hide").unwrap().is_dangling());
    assert_eq!(
        orchestrator.graph().get("situation_1").unwrap().generation_depth,
        1
    );

    let files = list_snapshots(dir.path()).await.unwrap();
    assert_eq!(files.len(), 2);
    let latest = files.last().unwrap();
    assert!(latest
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("step_000001_"));

    let snapshot = load_snapshot(latest).await.unwrap();
    assert_eq!(snapshot.generation_step, 1);
    assert_eq!(snapshot.current_situation_id.as_deref(), Some("situation_1"));
    assert_eq!(snapshot.choice_history, vec!["call_for_help"]);

    let restored = snapshot.to_graph().unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(
        restored
            .get("root")
            .and_then(|s| s.choice("call_for_help"))
            .and_then(|c| c.next_situation_id.as_deref()),
        Some("situation_1")
    );
}

#[tokio::test]
async fn test_full_run_produces_clean_graph() {
    setup_test_logging();
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(8, 3),
        Arc::new(ScriptedGenerator::new(3)),
        Arc::new(NullSnapshotStore),
        world(),
    )
    .with_cycle_policy(Box::new(NeverCycle));

    let report = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), OrchestratorState::Done);
    assert_eq!(report.stop_reason, Some(StopReason::TargetReached));
    assert!(report.is_clean(), "report should be clean: {report:?}");
    assert!(report.situation_count >= 8);
    assert!(report.failures.is_empty());
    assert_eq!(report.summary.successful_steps, report.summary.total_steps);
    assert!(orchestrator
        .graph()
        .situations()
        .all(|s| s.generation_depth <= 3));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(3, 2),
        Arc::new(FlakyGenerator::new(2)),
        Arc::new(NullSnapshotStore),
        world(),
    )
    .with_cycle_policy(Box::new(NeverCycle));
    orchestrator.initialize().await.unwrap();

    let outcomes = orchestrator.expand_step().await.unwrap();
    assert!(matches!(outcomes[0], StepOutcome::Expanded { .. }));
    assert_eq!(orchestrator.step(), 1);
    assert!(orchestrator.failures().is_empty());

    let summary = orchestrator.summary();
    assert_eq!(summary.total_retries, 2);
    assert_eq!(summary.successful_steps, summary.total_steps);
}

#[tokio::test]
async fn test_exhausted_choice_stays_dangling_then_finalize_repairs_it() {
    let generator = Arc::new(FlakyGenerator::new(0).with_broken_choice("option_2"));
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(4, 1),
        generator.clone(),
        Arc::new(NullSnapshotStore),
        world(),
    )
    .with_cycle_policy(Box::new(NeverCycle));
    orchestrator.initialize().await.unwrap();

    let reason = orchestrator.run_expansion().await.unwrap();
    assert_eq!(reason, StopReason::QueueEmpty);

    let failure = orchestrator
        .failures()
        .iter()
        .find(|f| f.choice_id.as_deref() == Some("option_2"))
        .expect("broken choice should be recorded");
    assert_eq!(failure.situation_id.as_deref(), Some("root"));
    assert!(orchestrator
        .graph()
        .get("root")
        .unwrap()
        .choice("option_2")
        .unwrap()
        .is_dangling());
    // Every attempt of the retry budget was spent on the broken choice.
    assert_eq!(generator.calls(), 1 + 3);

    let report = orchestrator.finalize().await.unwrap();
    assert!(report.is_clean(), "report should be clean: {report:?}");
    assert!(!report.failures.is_empty());
    assert!(report.summary.failed_steps.iter().any(|s| s.ends_with("option_2")));
    assert!(orchestrator
        .graph()
        .get("root")
        .unwrap()
        .choice("option_2")
        .unwrap()
        .is_resolved());
}

#[tokio::test]
async fn test_agent_driven_run() {
    let agent = ScriptedAgent::new(vec![
        AgentAction::CreateNpc {
            npc: Npc::new("Mara", "Dock boss"),
        },
        AgentAction::CreateSituation {
            choice_id: "option_1".to_string(),
            situation: Situation::new("cellar", "A flooded cellar")
                .with_choice(Choice::new("wade", "Wade deeper", ChoiceCategory::Movement)),
        },
        AgentAction::DownOneLevel {
            choice_id: Some("option_1".to_string()),
        },
        AgentAction::CreateChoices {
            choices: vec![Choice::new("climb_out", "Climb out", ChoiceCategory::Movement)
                .with_target("root")],
        },
        AgentAction::GetSituationById {
            situation_id: "missing".to_string(),
        },
    ]);
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(10, 3),
        Arc::new(ScriptedGenerator::new(2)),
        Arc::new(NullSnapshotStore),
        world(),
    )
    .with_cycle_policy(Box::new(NeverCycle));

    let report = orchestrator.run_agent(&agent).await.unwrap();

    assert_eq!(report.stop_reason, Some(StopReason::AgentCompleted));
    // Three mutations plus the final export.
    assert_eq!(report.generation_step, 4);
    assert!(report.is_clean(), "report should be clean: {report:?}");

    let cellar = orchestrator.graph().get("cellar").unwrap();
    assert_eq!(cellar.generation_depth, 1);
    assert_eq!(
        cellar.choice("climb_out").unwrap().next_situation_id.as_deref(),
        Some("root")
    );

    let contexts = agent.contexts();
    assert_eq!(contexts.len(), 6);
    assert!(contexts[1].last_outcome.as_ref().unwrap().mutated);
    assert_eq!(contexts[3].path, vec!["option_1"]);
    // The failed lookup comes back to the agent as a non-mutating outcome.
    let lookup = contexts[5].last_outcome.as_ref().unwrap();
    assert!(!lookup.mutated);
    assert!(lookup.message.contains("missing"));
}

#[tokio::test]
async fn test_cancelled_run_still_finalizes() {
    let mut orchestrator = GenerationOrchestrator::new(
        test_config(50, 4),
        Arc::new(ScriptedGenerator::new(2)),
        Arc::new(NullSnapshotStore),
        world(),
    )
    .with_cycle_policy(Box::new(NeverCycle));
    let handle = orchestrator.cancellation_handle();
    orchestrator.initialize().await.unwrap();
    orchestrator.expand_step().await.unwrap();
    handle.cancel();

    let reason = orchestrator.run_expansion().await.unwrap();
    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(orchestrator.graph().len(), 2);

    let report = orchestrator.finalize().await.unwrap();
    assert_eq!(report.stop_reason, Some(StopReason::Cancelled));
    assert!(report.is_clean(), "report should be clean: {report:?}");
}

#[tokio::test]
async fn test_forced_cycles_loop_back_to_visited_situations() {
    let mut config = test_config(20, 3);
    config.cycles.enabled = true;
    config.cycles.min_depth = 1;
    config.cycles.min_generated = 1;
    config.cycles.allowed_categories = vec![
        ChoiceCategory::Dialogue,
        ChoiceCategory::Action,
        ChoiceCategory::Investigation,
        ChoiceCategory::EmotionalResponse,
        ChoiceCategory::SocialInteraction,
        ChoiceCategory::Movement,
        ChoiceCategory::Other,
    ];
    let mut orchestrator = GenerationOrchestrator::new(
        config,
        Arc::new(ScriptedGenerator::new(2)),
        Arc::new(NullSnapshotStore),
        world(),
    )
    .with_cycle_policy(Box::new(AlwaysCycle));

    let report = orchestrator.run().await.unwrap();

    // Root choices sit below the minimum depth and are expanded normally;
    // every choice of a depth-one situation loops back.
    assert_eq!(report.situation_count, 3);
    assert_eq!(report.cycles_injected, 4);
    assert!(report.is_clean(), "report should be clean: {report:?}");
    assert!(orchestrator
        .graph()
        .situations()
        .filter(|s| s.generation_depth == 1)
        .flat_map(|s| s.choices.iter())
        .all(|c| c
            .next_situation_id
            .as_deref()
            .is_some_and(|t| orchestrator.graph().contains(t))));
}
