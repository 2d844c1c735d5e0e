//! Common test utilities for integration tests
//!
//! Provides shared fixtures, generators and helpers used across multiple
//! integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

use reforge::domain::errors::{DomainError, DomainResult};
use reforge::domain::models::{
    AgentAction, ArcSeed, Choice, ChoiceCategory, Config, Situation,
};
use reforge::domain::ports::{
    ArcSeedRequest, ContentGenerator, DecisionContext, DecisionMaker, RootSituationRequest,
    SituationRequest,
};
use reforge::ScriptedGenerator;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Config with millisecond backoff and cycles switched off
pub fn test_config(target: usize, max_depth: u32) -> Config {
    let mut config = Config::default();
    config.generation.target_situations = target;
    config.generation.max_depth = max_depth;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 4;
    config.cycles.enabled = false;
    config
}

/// Root `root` offering `call_for_help` and `hide`; every later situation is
/// `situation_<n>` with a single `press_on` choice.
#[derive(Debug, Default)]
pub struct ScenarioGenerator {
    counter: AtomicUsize,
}

#[async_trait]
impl ContentGenerator for ScenarioGenerator {
    fn name(&self) -> &str {
        "scenario"
    }

    async fn generate_arc_seed(&self, _request: &ArcSeedRequest) -> DomainResult<ArcSeed> {
        Ok(ArcSeed::new("The Blackout").with_theme_tags(["danger", "help"]))
    }

    async fn generate_root_situation(
        &self,
        _request: &RootSituationRequest,
    ) -> DomainResult<Situation> {
        Ok(Situation::new("root", "The lights go out across the district.")
            .with_tags(["danger"])
            .with_choice(Choice::new(
                "call_for_help",
                "Call for help",
                ChoiceCategory::Dialogue,
            ))
            .with_choice(Choice::new("hide", "Hide", ChoiceCategory::Action)))
    }

    async fn generate_situation(&self, request: &SituationRequest) -> DomainResult<Situation> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(
            Situation::new(format!("situation_{n}"), format!("After {}", request.choice.id))
                .with_tags(["danger"])
                .with_choice(Choice::new("press_on", "Press on", ChoiceCategory::Movement)),
        )
    }
}

/// Wraps [`ScriptedGenerator`]; situation requests fail transiently until
/// `transient_failures` calls have been made, and always fail for the listed
/// choice ids.
pub struct FlakyGenerator {
    inner: ScriptedGenerator,
    transient_failures: usize,
    broken_choices: HashSet<String>,
    calls: AtomicUsize,
}

impl FlakyGenerator {
    pub fn new(transient_failures: usize) -> Self {
        Self {
            inner: ScriptedGenerator::new(2),
            transient_failures,
            broken_choices: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_broken_choice(mut self, choice_id: &str) -> Self {
        self.broken_choices.insert(choice_id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for FlakyGenerator {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn generate_arc_seed(&self, request: &ArcSeedRequest) -> DomainResult<ArcSeed> {
        self.inner.generate_arc_seed(request).await
    }

    async fn generate_root_situation(
        &self,
        request: &RootSituationRequest,
    ) -> DomainResult<Situation> {
        self.inner.generate_root_situation(request).await
    }

    async fn generate_situation(&self, request: &SituationRequest) -> DomainResult<Situation> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_choices.contains(&request.choice.id) {
            return Err(DomainError::TransientGenerationFailure(format!(
                "model keeps timing out on {}",
                request.choice.id
            )));
        }
        if call < self.transient_failures {
            return Err(DomainError::TransientGenerationFailure(
                "rate limited".to_string(),
            ));
        }
        self.inner.generate_situation(request).await
    }
}

/// Decision maker replaying a fixed list of actions, then completing.
#[derive(Default)]
pub struct ScriptedAgent {
    actions: Mutex<VecDeque<AgentAction>>,
    seen: Mutex<Vec<DecisionContext>>,
}

impl ScriptedAgent {
    pub fn new(actions: Vec<AgentAction>) -> Self {
        Self {
            actions: Mutex::new(actions.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Contexts passed to every decision, in order.
    pub fn contexts(&self) -> Vec<DecisionContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionMaker for ScriptedAgent {
    async fn select_action(&self, context: &DecisionContext) -> DomainResult<AgentAction> {
        self.seen.lock().unwrap().push(context.clone());
        Ok(self
            .actions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AgentAction::Complete))
    }
}
