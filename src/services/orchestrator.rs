use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc as SharedArc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActionOutcome, AgentAction, Arc, ArcSeed, Choice, ChoiceCategory, ChoiceEffects, Config,
    PlayerState, Situation, Snapshot, WorldContext,
};
use crate::domain::ports::{
    ArcSeedRequest, ContentGenerator, DecisionContext, DecisionMaker, RootSituationRequest,
    SituationRequest, SnapshotStore,
};
use crate::services::bridge_builder::{BridgeBuilder, BridgeReport};
use crate::services::connectivity::ConnectivityAnalyzer;
use crate::services::content_graph::ContentGraph;
use crate::services::cycle_manager::{CycleManager, CyclePolicy};
use crate::services::priority_calculator::{ChoicePriorityCalculator, PendingChoice, PendingQueue};
use crate::services::report::{FailureRecord, GenerationReport, GenerationSummary, StopReason};
use crate::services::retry::{GenerationMetrics, RetryMetricsWrapper};
use crate::services::snapshot::capture_snapshot;
use crate::services::state_tree::{NodeId, StateTree, StateTreeNode};

/// Lifecycle of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Initializing,
    Expanding,
    Finalizing,
    Done,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "INITIALIZING",
            Self::Expanding => "EXPANDING",
            Self::Finalizing => "FINALIZING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Requests a stop at the next loop boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(SharedArc<AtomicBool>);

impl CancellationHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one popped pending choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Expanded {
        situation_id: String,
    },
    CycleInjected {
        situation_id: String,
        choice_id: String,
        target: String,
    },
    Skipped {
        situation_id: String,
        choice_id: String,
    },
    Failed {
        situation_id: String,
        choice_id: String,
        error: String,
    },
}

enum Prepared {
    Request(Box<SituationRequest>),
    Cycle(String),
    Skip,
}

/// Drives generation through INITIALIZING, EXPANDING, FINALIZING and DONE
///
/// Owns the content graph and state tree. Every successful mutation advances
/// the step counter by one and persists a snapshot.
pub struct GenerationOrchestrator {
    config: Config,
    generator: SharedArc<dyn ContentGenerator>,
    store: SharedArc<dyn SnapshotStore>,
    retry: RetryMetricsWrapper,
    priority: ChoicePriorityCalculator,
    cycles: CycleManager,
    bridges: BridgeBuilder,
    analyzer: ConnectivityAnalyzer,
    graph: ContentGraph,
    tree: StateTree,
    queue: PendingQueue,
    player: PlayerState,
    state: OrchestratorState,
    step: u32,
    iterations: u32,
    active_threads: Vec<String>,
    visited: Vec<String>,
    metrics: Vec<GenerationMetrics>,
    failures: Vec<FailureRecord>,
    cycles_injected: usize,
    bridge_report: BridgeReport,
    soft_locks_resolved: Vec<String>,
    finalize_passes: u32,
    stop_reason: Option<StopReason>,
    expansion_started: Option<Instant>,
    cancellation: CancellationHandle,
}

impl GenerationOrchestrator {
    pub fn new(
        config: Config,
        generator: SharedArc<dyn ContentGenerator>,
        store: SharedArc<dyn SnapshotStore>,
        world: WorldContext,
    ) -> Self {
        let tree = StateTree::new(StateTreeNode::new(world, None, None, 0));
        Self {
            retry: RetryMetricsWrapper::from_config(&config.retry),
            priority: ChoicePriorityCalculator::from_config(&config.priority),
            cycles: CycleManager::new(config.cycles.clone()),
            bridges: BridgeBuilder::new(),
            analyzer: ConnectivityAnalyzer::new(),
            graph: ContentGraph::with_policy(config.generation.duplicate_id_policy),
            tree,
            queue: PendingQueue::new(),
            player: PlayerState::with_uniform_stats("Player", 10),
            state: OrchestratorState::Initializing,
            step: 0,
            iterations: 0,
            active_threads: Vec::new(),
            visited: Vec::new(),
            metrics: Vec::new(),
            failures: Vec::new(),
            cycles_injected: 0,
            bridge_report: BridgeReport::default(),
            soft_locks_resolved: Vec::new(),
            finalize_passes: 0,
            stop_reason: None,
            expansion_started: None,
            cancellation: CancellationHandle::default(),
            config,
            generator,
            store,
        }
    }

    pub fn with_player(mut self, player: PlayerState) -> Self {
        self.player = player;
        self
    }

    pub fn with_cycle_policy(mut self, policy: Box<dyn CyclePolicy>) -> Self {
        self.cycles = CycleManager::with_policy(self.config.cycles.clone(), policy);
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn graph(&self) -> &ContentGraph {
        &self.graph
    }

    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn metrics(&self) -> &[GenerationMetrics] {
        &self.metrics
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn summary(&self) -> GenerationSummary {
        GenerationSummary::from_metrics(&self.metrics)
    }

    /// Snapshot of the current state, without persisting it.
    pub fn snapshot(&self, step_name: &str) -> Snapshot {
        capture_snapshot(&self.graph, &self.tree, &self.player, self.step, step_name)
    }

    fn ensure_state(&self, expected: OrchestratorState, to: OrchestratorState) -> DomainResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }

    fn record_failure(
        &mut self,
        step_name: &str,
        situation_id: Option<&str>,
        choice_id: Option<&str>,
        error: &DomainError,
    ) {
        self.failures.push(FailureRecord {
            step_name: step_name.to_string(),
            situation_id: situation_id.map(str::to_string),
            choice_id: choice_id.map(str::to_string),
            error: error.to_string(),
        });
    }

    async fn persist(&mut self, step_name: &str) {
        if !self.config.snapshots.enabled {
            return;
        }
        let snapshot = self.snapshot(step_name);
        match self.store.save(&snapshot).await {
            Ok(Some(path)) => debug!(step = self.step, path = %path.display(), "snapshot saved"),
            Ok(None) => {}
            Err(err) => {
                error!(step = self.step, step_name, error = %err, "failed to persist snapshot");
                self.record_failure(step_name, None, None, &err);
            }
        }
    }

    fn enqueue_dangling(&mut self, situation_id: &str) {
        let Some(situation) = self.graph.get(situation_id) else {
            return;
        };
        if situation.generation_depth >= self.config.generation.max_depth {
            debug!(situation_id, depth = situation.generation_depth, "depth limit reached, not enqueuing");
            return;
        }
        for choice in situation.dangling_choices() {
            let priority = self
                .priority
                .calculate(situation, choice, &self.player, &self.active_threads);
            self.queue.push(&situation.id, &choice.id, situation.generation_depth, priority);
        }
    }

    /// Request the arc seed and root situation, seed graph and tree, persist
    /// step 0 and move to EXPANDING.
    #[instrument(skip(self), fields(generator = %self.generator.name()))]
    pub async fn initialize(&mut self) -> DomainResult<()> {
        self.ensure_state(OrchestratorState::Initializing, OrchestratorState::Expanding)?;
        let generator = SharedArc::clone(&self.generator);
        let world = self.tree.node(self.tree.root())?.context.clone();

        let seed_request = ArcSeedRequest {
            world: world.clone(),
            player: self.player.clone(),
            existing_arcs: Vec::new(),
        };
        let outcome = self
            .retry
            .execute("arc_seed", || generator.generate_arc_seed(&seed_request))
            .await;
        let (seed, metrics) = outcome.into_parts();
        self.metrics.push(metrics);
        let seed = seed?;

        let arc_id = self.graph.unique_arc_id("arc_1");
        self.graph.add_arc(Arc::new(arc_id.clone(), seed.clone()))?;

        let root_request = RootSituationRequest {
            world,
            player: self.player.clone(),
            arc_id: arc_id.clone(),
            arc_seed: seed.clone(),
        };
        let outcome = self
            .retry
            .execute("root_situation", || {
                generator.generate_root_situation(&root_request)
            })
            .await;
        let (root, metrics) = outcome.into_parts();
        self.metrics.push(metrics);
        let mut root = root?;
        root.generation_depth = 0;
        root.arc_id = Some(arc_id.clone());

        let root_id = self.graph.insert(root)?;
        self.graph.set_root(&root_id)?;
        self.tree.bind_root(&root_id, Some(arc_id));
        self.active_threads = seed.theme_tags.clone();
        self.visited.push(root_id.clone());

        self.persist("initial_arc").await;
        self.enqueue_dangling(&root_id);
        self.state = OrchestratorState::Expanding;
        self.expansion_started = Some(Instant::now());
        info!(root_id = %root_id, arc = %seed.title, pending = self.queue.len(), "generation initialized");
        Ok(())
    }

    /// Why expansion should stop now, if it should.
    pub fn next_stop_reason(&self) -> Option<StopReason> {
        let limits = &self.config.generation;
        if self.cancellation.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        if self.graph.len() >= limits.target_situations {
            return Some(StopReason::TargetReached);
        }
        if self.iterations >= limits.max_iterations {
            return Some(StopReason::IterationLimit);
        }
        if let (Some(budget), Some(started)) = (limits.max_duration_secs, self.expansion_started) {
            if started.elapsed() >= Duration::from_secs(budget) {
                return Some(StopReason::TimeLimit);
            }
        }
        if self.queue.is_empty() {
            return Some(StopReason::QueueEmpty);
        }
        None
    }

    fn prepare(&mut self, pending: &PendingChoice) -> Prepared {
        let Some(parent) = self.graph.get(&pending.situation_id) else {
            return Prepared::Skip;
        };
        let Some(choice) = parent.choice(&pending.choice_id) else {
            return Prepared::Skip;
        };
        if choice.is_resolved() {
            return Prepared::Skip;
        }
        if parent.generation_depth >= self.config.generation.max_depth {
            debug!(situation_id = %parent.id, "depth limit reached, skipping");
            return Prepared::Skip;
        }

        if let Some(target) =
            self.cycles
                .maybe_inject_cycle(&self.graph, &parent.id, choice, &self.visited)
        {
            return Prepared::Cycle(target);
        }

        let node = self
            .tree
            .find_node_with_situation(&parent.id)
            .unwrap_or_else(|| self.tree.root());
        let world = self
            .tree
            .node(node)
            .map(|n| n.context.clone())
            .unwrap_or_default();
        let arc_seed = parent
            .arc_id
            .as_deref()
            .and_then(|id| self.graph.arc(id))
            .map(|a| a.seed.clone());

        Prepared::Request(Box::new(SituationRequest {
            world,
            player: self.player.clone(),
            arc_id: parent.arc_id.clone(),
            arc_seed,
            parent: parent.clone(),
            choice: choice.clone(),
            depth: parent.generation_depth + 1,
            existing_ids: self.graph.ids().map(str::to_string).collect(),
            active_threads: self.active_threads.clone(),
        }))
    }

    /// Insert `situation` behind `parent_id.choice_id` and add the matching
    /// tree node under `parent_node`.
    fn attach_situation(
        &mut self,
        parent_node: NodeId,
        parent_id: &str,
        choice_id: &str,
        mut situation: Situation,
    ) -> DomainResult<(String, NodeId)> {
        let parent = self
            .graph
            .get(parent_id)
            .ok_or_else(|| DomainError::SituationNotFound(parent_id.to_string()))?;
        let effects = parent
            .choice(choice_id)
            .map(|c| c.effects.clone())
            .ok_or_else(|| DomainError::ChoiceNotFound {
                situation_id: parent_id.to_string(),
                choice_id: choice_id.to_string(),
            })?;
        situation.generation_depth = parent.generation_depth + 1;
        if situation.arc_id.is_none() {
            situation.arc_id = parent.arc_id.clone();
        }
        if self.tree.node(parent_node)?.children.contains_key(choice_id) {
            return Err(DomainError::DuplicateChild {
                node: parent_node.0,
                choice_id: choice_id.to_string(),
            });
        }

        let id = self.graph.insert_and_resolve(parent_id, choice_id, situation)?;
        let context = self.tree.node(parent_node)?.context.with_additions(&effects);
        let arc_id = self.graph.get(&id).and_then(|s| s.arc_id.clone());
        let node = self.tree.add_child(
            parent_node,
            choice_id,
            StateTreeNode::new(context, Some(id.clone()), arc_id, self.step + 1),
        )?;
        self.visited.push(id.clone());
        Ok((id, node))
    }

    async fn apply_generated(&mut self, pending: &PendingChoice, situation: Situation) -> StepOutcome {
        let parent_node = self
            .tree
            .find_node_with_situation(&pending.situation_id)
            .unwrap_or_else(|| self.tree.root());
        match self.attach_situation(parent_node, &pending.situation_id, &pending.choice_id, situation) {
            Ok((id, node)) => {
                if let Err(err) = self.tree.navigate_to(node) {
                    warn!(error = %err, "could not move to new node");
                }
                self.enqueue_dangling(&id);
                self.step += 1;
                self.persist(&format!("expand_{id}")).await;
                info!(
                    step = self.step,
                    situation_id = %id,
                    parent = %pending.situation_id,
                    choice_id = %pending.choice_id,
                    "expanded choice"
                );
                StepOutcome::Expanded { situation_id: id }
            }
            Err(err) => {
                warn!(
                    situation_id = %pending.situation_id,
                    choice_id = %pending.choice_id,
                    error = %err,
                    "discarded generated situation"
                );
                let step_name = format!("expand_{}", pending.choice_id);
                self.record_failure(&step_name, Some(&pending.situation_id), Some(&pending.choice_id), &err);
                StepOutcome::Failed {
                    situation_id: pending.situation_id.clone(),
                    choice_id: pending.choice_id.clone(),
                    error: err.to_string(),
                }
            }
        }
    }

    async fn apply_cycle(&mut self, pending: &PendingChoice, target: String) -> DomainResult<StepOutcome> {
        self.graph
            .resolve(&pending.situation_id, &pending.choice_id, &target)?;
        self.cycles_injected += 1;
        self.step += 1;
        self.persist(&format!("cycle_{}", pending.choice_id)).await;
        info!(
            step = self.step,
            situation_id = %pending.situation_id,
            choice_id = %pending.choice_id,
            target = %target,
            "injected beneficial cycle"
        );
        Ok(StepOutcome::CycleInjected {
            situation_id: pending.situation_id.clone(),
            choice_id: pending.choice_id.clone(),
            target,
        })
    }

    /// Pop up to `max_concurrent_requests` pending choices and expand them.
    ///
    /// Requests run concurrently; results are applied one atomic step at a
    /// time. A failed request leaves its choice dangling.
    pub async fn expand_step(&mut self) -> DomainResult<Vec<StepOutcome>> {
        self.ensure_state(OrchestratorState::Expanding, OrchestratorState::Expanding)?;
        self.iterations += 1;
        let capacity = self.config.generation.max_concurrent_requests.max(1);
        let mut outcomes = Vec::new();
        let mut batch: Vec<(PendingChoice, Box<SituationRequest>)> = Vec::new();

        while batch.len() < capacity {
            let Some(pending) = self.queue.pop() else {
                break;
            };
            match self.prepare(&pending) {
                Prepared::Request(request) => batch.push((pending, request)),
                Prepared::Cycle(target) => outcomes.push(self.apply_cycle(&pending, target).await?),
                Prepared::Skip => outcomes.push(StepOutcome::Skipped {
                    situation_id: pending.situation_id,
                    choice_id: pending.choice_id,
                }),
            }
        }
        if batch.is_empty() {
            return Ok(outcomes);
        }

        let results = {
            let generator = &self.generator;
            let retry = &self.retry;
            join_all(batch.iter().map(|(pending, request)| {
                let step_name = format!("situation_{}_{}", pending.situation_id, pending.choice_id);
                async move {
                    retry
                        .execute(&step_name, || generator.generate_situation(request))
                        .await
                }
            }))
            .await
        };

        for ((pending, _), outcome) in batch.into_iter().zip(results) {
            let (result, metrics) = outcome.into_parts();
            let step_name = metrics.step_name.clone();
            self.metrics.push(metrics);
            match result {
                Ok(situation) => outcomes.push(self.apply_generated(&pending, situation).await),
                Err(err) => {
                    warn!(
                        situation_id = %pending.situation_id,
                        choice_id = %pending.choice_id,
                        error = %err,
                        "generation failed, choice left dangling"
                    );
                    self.record_failure(&step_name, Some(&pending.situation_id), Some(&pending.choice_id), &err);
                    outcomes.push(StepOutcome::Failed {
                        situation_id: pending.situation_id,
                        choice_id: pending.choice_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        if self.config.generation.step_delay_ms > 0 {
            sleep(Duration::from_millis(self.config.generation.step_delay_ms)).await;
        }
        Ok(outcomes)
    }

    /// Expand until a budget runs out, the queue drains or a stop is requested.
    pub async fn run_expansion(&mut self) -> DomainResult<StopReason> {
        self.ensure_state(OrchestratorState::Expanding, OrchestratorState::Expanding)?;
        let reason = loop {
            if let Some(reason) = self.next_stop_reason() {
                break reason;
            }
            self.expand_step().await?;
        };
        info!(reason = ?reason, situations = self.graph.len(), step = self.step, "expansion stopped");
        self.stop_reason = Some(reason);
        Ok(reason)
    }

    /// Repair passes until no dangling choices, unreachable situations or
    /// soft-locks remain, then persist the final snapshot and move to DONE.
    pub async fn finalize(&mut self) -> DomainResult<GenerationReport> {
        self.ensure_state(OrchestratorState::Expanding, OrchestratorState::Finalizing)?;
        self.state = OrchestratorState::Finalizing;

        let max_passes = self.config.generation.max_finalize_passes.max(1);
        for pass in 1..=max_passes {
            self.finalize_passes = pass;
            let report = self.bridges.repair(&mut self.graph)?;
            self.bridge_report.merge(report);
            let marked = self.cycles.resolve_soft_locks(&mut self.graph)?;
            self.soft_locks_resolved.extend(marked);

            if self.is_structurally_clean() {
                break;
            }
            debug!(pass, "graph still needs repair");
        }

        self.step += 1;
        self.persist("final_export").await;
        self.state = OrchestratorState::Done;

        let report = self.build_report();
        let summary = &report.summary;
        info!(
            situations = report.situation_count,
            steps = report.generation_step,
            successful_calls = summary.successful_steps,
            total_calls = summary.total_steps,
            retries = summary.total_retries,
            failures = report.failures.len(),
            clean = report.is_clean(),
            "generation finished"
        );
        Ok(report)
    }

    fn is_structurally_clean(&self) -> bool {
        let unreachable = self
            .graph
            .root_id()
            .map(|root| self.analyzer.reachable_from_root(&self.graph, root))
            .unwrap_or_default();
        self.graph.all_dangling_choices().is_empty()
            && unreachable.is_empty()
            && self.cycles.detect_soft_locks(&self.graph).is_empty()
    }

    pub fn build_report(&self) -> GenerationReport {
        GenerationReport {
            situation_count: self.graph.len(),
            arc_count: self.graph.arcs().count(),
            generation_step: self.step,
            stop_reason: self.stop_reason,
            cycles_injected: self.cycles_injected,
            remaining_dangling: self.graph.all_dangling_choices(),
            unresolved_soft_locks: self.cycles.detect_soft_locks(&self.graph),
            unreachable: self
                .graph
                .root_id()
                .map(|root| self.analyzer.reachable_from_root(&self.graph, root))
                .unwrap_or_default(),
            soft_locks_resolved: self.soft_locks_resolved.clone(),
            bridges: self.bridge_report.clone(),
            failures: self.failures.clone(),
            summary: self.summary(),
            finalize_passes: self.finalize_passes,
        }
    }

    /// Full autonomous run: initialize, expand, finalize.
    pub async fn run(&mut self) -> DomainResult<GenerationReport> {
        self.initialize().await?;
        self.run_expansion().await?;
        self.finalize().await
    }

    /// Agent-driven run: `decider` picks one action per iteration until it
    /// completes or the iteration cap is hit, then the graph is finalized.
    pub async fn run_agent(&mut self, decider: &dyn DecisionMaker) -> DomainResult<GenerationReport> {
        if self.state == OrchestratorState::Initializing {
            self.initialize().await?;
        }
        self.ensure_state(OrchestratorState::Expanding, OrchestratorState::Expanding)?;

        let mut last_outcome: Option<ActionOutcome> = None;
        let reason = loop {
            if self.cancellation.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.iterations >= self.config.generation.max_iterations {
                break StopReason::IterationLimit;
            }
            self.iterations += 1;

            let context = self.decision_context(last_outcome.take());
            let step_name = format!("decide_{}", self.iterations);
            let outcome = self
                .retry
                .execute(&step_name, || decider.select_action(&context))
                .await;
            let (action, metrics) = outcome.into_parts();
            self.metrics.push(metrics);
            let action = match action {
                Ok(action) => action,
                Err(err) => {
                    warn!(iteration = self.iterations, error = %err, "decision failed");
                    self.record_failure(&step_name, None, None, &err);
                    continue;
                }
            };

            if action == AgentAction::Complete {
                break StopReason::AgentCompleted;
            }
            let name = action.name();
            let applied = match self.apply_action(action.clone()) {
                Ok(outcome) => outcome,
                Err(err) => {
                    debug!(action = name, error = %err, "action rejected");
                    ActionOutcome::query(&action, err.to_string())
                }
            };
            if applied.mutated {
                self.step += 1;
                self.persist(name).await;
            }
            info!(step = self.step, action = name, mutated = applied.mutated, "applied agent action");
            last_outcome = Some(applied);
        };

        self.stop_reason = Some(reason);
        self.finalize().await
    }

    fn decision_context(&self, last_outcome: Option<ActionOutcome>) -> DecisionContext {
        let node = self.tree.current_node();
        DecisionContext {
            step: self.step,
            world: node.context.clone(),
            player: self.player.clone(),
            current_situation: node
                .situation_id
                .as_deref()
                .and_then(|id| self.graph.get(id))
                .cloned(),
            path: self.tree.path_to_root(),
            dangling_choices: self.graph.all_dangling_choices(),
            situation_count: self.graph.len(),
            last_outcome,
        }
    }

    fn current_situation_id(&self) -> DomainResult<String> {
        self.tree
            .current_node()
            .situation_id
            .clone()
            .ok_or_else(|| DomainError::SituationNotFound("<current>".to_string()))
    }

    fn navigate_to_situation(&mut self, situation_id: &str) -> DomainResult<NodeId> {
        if !self.graph.contains(situation_id) {
            return Err(DomainError::SituationNotFound(situation_id.to_string()));
        }
        let node = self
            .tree
            .find_node_with_situation(situation_id)
            .ok_or_else(|| DomainError::SituationNotFound(situation_id.to_string()))?;
        self.tree.navigate_to(node)
    }

    /// Apply one agent action. Errors leave graph and tree untouched.
    pub fn apply_action(&mut self, action: AgentAction) -> DomainResult<ActionOutcome> {
        if self.state == OrchestratorState::Done {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: OrchestratorState::Expanding.to_string(),
            });
        }
        let current = self.tree.current();
        match &action {
            AgentAction::CreateNpc { npc } => {
                let effects = ChoiceEffects {
                    new_npcs: vec![npc.clone()],
                    ..ChoiceEffects::default()
                };
                self.tree.append_entities(current, &effects)?;
                Ok(ActionOutcome::mutation(&action, format!("added NPC {}", npc.name)))
            }
            AgentAction::CreateFaction { faction } => {
                let effects = ChoiceEffects {
                    new_factions: vec![faction.clone()],
                    ..ChoiceEffects::default()
                };
                self.tree.append_entities(current, &effects)?;
                Ok(ActionOutcome::mutation(&action, format!("added faction {}", faction.name)))
            }
            AgentAction::CreateTechnology { technology } => {
                let effects = ChoiceEffects {
                    new_technologies: vec![technology.clone()],
                    ..ChoiceEffects::default()
                };
                self.tree.append_entities(current, &effects)?;
                Ok(ActionOutcome::mutation(&action, format!("added technology {}", technology.name)))
            }
            AgentAction::CreateSituation { choice_id, situation } => {
                let parent_id = self.current_situation_id()?;
                let (id, _) = self.attach_situation(current, &parent_id, choice_id, situation.clone())?;
                Ok(ActionOutcome::mutation(&action, format!("created situation {id}")))
            }
            AgentAction::CreateMultipleSituations { situations } => {
                let parent_id = self.current_situation_id()?;
                let mut created = Vec::new();
                let mut rejected = Vec::new();
                for item in situations {
                    match self.attach_situation(current, &parent_id, &item.choice_id, item.situation.clone()) {
                        Ok((id, _)) => created.push(id),
                        Err(err) => rejected.push(format!("{}: {err}", item.choice_id)),
                    }
                }
                if created.is_empty() {
                    return Ok(ActionOutcome::query(
                        &action,
                        format!("no situations created; {}", rejected.join("; ")),
                    ));
                }
                let mut message = format!("created {}", created.join(", "));
                if !rejected.is_empty() {
                    message.push_str(&format!("; rejected {}", rejected.join("; ")));
                }
                Ok(ActionOutcome::mutation(&action, message))
            }
            AgentAction::CreateChoices { choices } => {
                let situation_id = self.current_situation_id()?;
                if let Some(bad) = choices.iter().find(|c| {
                    c.next_situation_id
                        .as_deref()
                        .is_some_and(|t| !self.graph.contains(t))
                }) {
                    return Err(DomainError::UnknownTarget {
                        choice_id: bad.id.clone(),
                        target: bad.next_situation_id.clone().unwrap_or_default(),
                    });
                }
                let mut ids = Vec::with_capacity(choices.len());
                for choice in choices {
                    ids.push(self.graph.append_choice(&situation_id, choice.clone())?);
                }
                Ok(ActionOutcome::mutation(&action, format!("added choices {}", ids.join(", "))))
            }
            AgentAction::CreateArc { seed, root } => self.create_arc(&action, seed, root),
            AgentAction::GoToSituation { situation_id } => {
                self.navigate_to_situation(situation_id)?;
                Ok(ActionOutcome::query(&action, format!("now at {situation_id}")))
            }
            AgentAction::UpOneLevel => {
                self.tree.navigate_up()?;
                Ok(ActionOutcome::query(&action, "moved up"))
            }
            AgentAction::DownOneLevel { choice_id } => {
                self.tree.navigate_down(choice_id.as_deref())?;
                Ok(ActionOutcome::query(&action, "moved down"))
            }
            AgentAction::GoToArcRoot => {
                let arc_id = self
                    .tree
                    .current_node()
                    .arc_id
                    .clone()
                    .ok_or_else(|| DomainError::ArcNotFound("<current>".to_string()))?;
                let root = self
                    .graph
                    .arc(&arc_id)
                    .and_then(|a| a.root_situation())
                    .map(str::to_string)
                    .ok_or_else(|| DomainError::ArcNotFound(arc_id.clone()))?;
                self.navigate_to_situation(&root)?;
                Ok(ActionOutcome::query(&action, format!("now at arc root {root}")))
            }
            AgentAction::GoToWorldRoot => {
                self.tree.navigate_to(self.tree.root())?;
                Ok(ActionOutcome::query(&action, "now at world root"))
            }
            AgentAction::GetSituationById { situation_id } => {
                let situation = self
                    .graph
                    .get(situation_id)
                    .ok_or_else(|| DomainError::SituationNotFound(situation_id.clone()))?;
                let message = serde_json::to_string(situation)?;
                Ok(ActionOutcome::query(&action, message))
            }
            AgentAction::FindMissingSituations => {
                let missing: Vec<String> = self
                    .graph
                    .all_dangling_choices()
                    .into_iter()
                    .map(|(s, c)| format!("{s}.{c}"))
                    .collect();
                Ok(ActionOutcome::query(&action, missing.join(", ")))
            }
            AgentAction::IdentifyNarrativeGaps => {
                let report = self.analyzer.report(&self.graph, Some((&self.tree, current)));
                let locks = self.cycles.detect_soft_locks(&self.graph).len();
                Ok(ActionOutcome::query(
                    &action,
                    format!(
                        "{} incomplete situations, {} dangling choices, {} unreachable, {locks} soft-locks",
                        report.incomplete_situations,
                        report.dead_end_choices,
                        report.unreachable.len()
                    ),
                ))
            }
            AgentAction::Complete => Ok(ActionOutcome::query(&action, "complete")),
        }
    }

    /// Add a new arc entered from the world root.
    ///
    /// Every precondition is checked before the first mutation, so a rejected
    /// arc leaves graph and tree unchanged.
    fn create_arc(&mut self, action: &AgentAction, seed: &ArcSeed, root: &Situation) -> DomainResult<ActionOutcome> {
        let world_root = self
            .graph
            .root_id()
            .map(str::to_string)
            .ok_or_else(|| DomainError::SituationNotFound("<world root>".to_string()))?;
        let world_root_situation = self
            .graph
            .get(&world_root)
            .ok_or_else(|| DomainError::SituationNotFound(world_root.clone()))?;
        self.graph.check_insertable(&root.id)?;

        let arc_id = self
            .graph
            .unique_arc_id(&format!("arc_{}", self.graph.arcs().count() + 1));
        let tree_root = self.tree.root();
        let tree_children = &self.tree.node(tree_root)?.children;
        let base = format!("enter_{arc_id}");
        let mut choice_id = base.clone();
        let mut n = 2;
        while world_root_situation.choice(&choice_id).is_some() || tree_children.contains_key(&choice_id) {
            choice_id = format!("{base}_{n}");
            n += 1;
        }

        self.graph.add_arc(Arc::new(arc_id.clone(), seed.clone()))?;
        let mut situation = root.clone();
        situation.arc_id = Some(arc_id.clone());
        situation.generation_depth = 1;
        let root_id = self.graph.insert(situation)?;
        let entry = Choice::new(choice_id, format!("Begin: {}", seed.title), ChoiceCategory::Movement)
            .with_target(root_id.clone());
        let choice_id = self.graph.append_choice(&world_root, entry)?;

        let context = self.tree.node(tree_root)?.context.clone();
        self.tree.add_child(
            tree_root,
            &choice_id,
            StateTreeNode::new(context, Some(root_id.clone()), Some(arc_id.clone()), self.step + 1),
        )?;
        self.visited.push(root_id.clone());
        Ok(ActionOutcome::mutation(action, format!("created arc {arc_id} rooted at {root_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ChoiceSituation, DuplicateIdPolicy, Npc};
    use crate::domain::ports::NullSnapshotStore;
    use crate::infrastructure::generators::ScriptedGenerator;
    use crate::services::cycle_manager::NeverCycle;

    fn create_test_config(target: usize, max_depth: u32) -> Config {
        let mut config = Config::default();
        config.generation.target_situations = target;
        config.generation.max_depth = max_depth;
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        config.cycles.enabled = false;
        config
    }

    fn create_test_orchestrator(config: Config) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            config,
            SharedArc::new(ScriptedGenerator::new(2)),
            SharedArc::new(NullSnapshotStore),
            WorldContext::default(),
        )
        .with_cycle_policy(Box::new(NeverCycle))
    }

    #[tokio::test]
    async fn test_initialize_seeds_graph() {
        let mut orchestrator = create_test_orchestrator(create_test_config(5, 2));
        orchestrator.initialize().await.unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Expanding);
        assert_eq!(orchestrator.graph().len(), 1);
        assert_eq!(orchestrator.step(), 0);
        assert_eq!(orchestrator.pending_count(), 2);
        assert!(orchestrator.graph().root_id().is_some());
    }

    #[tokio::test]
    async fn test_expand_before_initialize_rejected() {
        let mut orchestrator = create_test_orchestrator(create_test_config(5, 2));
        let result = orchestrator.expand_step().await;
        assert!(matches!(result, Err(DomainError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_each_expansion_advances_step_by_one() {
        let mut orchestrator = create_test_orchestrator(create_test_config(10, 3));
        orchestrator.initialize().await.unwrap();

        let outcomes = orchestrator.expand_step().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], StepOutcome::Expanded { .. }));
        assert_eq!(orchestrator.step(), 1);
        assert_eq!(orchestrator.graph().len(), 2);
        assert_eq!(orchestrator.tree().len(), 2);
    }

    #[tokio::test]
    async fn test_full_run_is_clean() {
        let mut orchestrator = create_test_orchestrator(create_test_config(5, 2));
        let report = orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Done);
        assert!(report.is_clean());
        assert!(report.remaining_dangling.is_empty());
        assert!(orchestrator
            .graph()
            .situations()
            .all(|s| s.generation_depth <= 2));
    }

    #[tokio::test]
    async fn test_done_rejects_mutation() {
        let mut orchestrator = create_test_orchestrator(create_test_config(3, 2));
        orchestrator.run().await.unwrap();

        assert!(matches!(
            orchestrator.expand_step().await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            orchestrator.finalize().await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            orchestrator.apply_action(AgentAction::UpOneLevel),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_expansion() {
        let mut orchestrator = create_test_orchestrator(create_test_config(50, 5));
        orchestrator.initialize().await.unwrap();
        orchestrator.cancellation_handle().cancel();

        let reason = orchestrator.run_expansion().await.unwrap();
        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(orchestrator.graph().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fan_out() {
        let mut config = create_test_config(10, 3);
        config.generation.max_concurrent_requests = 2;
        let mut orchestrator = create_test_orchestrator(config);
        orchestrator.initialize().await.unwrap();

        let outcomes = orchestrator.expand_step().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(orchestrator.step(), 2);
        assert_eq!(orchestrator.graph().len(), 3);
    }

    #[tokio::test]
    async fn test_agent_actions() {
        let mut orchestrator = create_test_orchestrator(create_test_config(10, 3));
        orchestrator.initialize().await.unwrap();
        let root_id = orchestrator.graph().root_id().unwrap().to_string();
        let choice_id = orchestrator.graph().get(&root_id).unwrap().choices[0].id.clone();

        let outcome = orchestrator
            .apply_action(AgentAction::CreateNpc {
                npc: Npc::new("Ada", "A fixer"),
            })
            .unwrap();
        assert!(outcome.mutated);
        assert_eq!(orchestrator.tree().current_node().context.npcs.len(), 1);

        let outcome = orchestrator
            .apply_action(AgentAction::CreateMultipleSituations {
                situations: vec![ChoiceSituation {
                    choice_id: choice_id.clone(),
                    situation: Situation::new("alley", "A dark alley"),
                }],
            })
            .unwrap();
        assert!(outcome.mutated);
        assert_eq!(orchestrator.graph().get("alley").unwrap().generation_depth, 1);

        let down = orchestrator
            .apply_action(AgentAction::DownOneLevel {
                choice_id: Some(choice_id.clone()),
            })
            .unwrap();
        assert!(!down.mutated);
        assert_eq!(orchestrator.tree().current_node().situation_id.as_deref(), Some("alley"));
        // Child inherits the NPC added at the root.
        assert_eq!(orchestrator.tree().current_node().context.npcs.len(), 1);

        assert!(matches!(
            orchestrator.apply_action(AgentAction::DownOneLevel { choice_id: None }),
            Err(DomainError::NoSuchChild(_))
        ));
        assert_eq!(orchestrator.tree().current_node().situation_id.as_deref(), Some("alley"));

        orchestrator.apply_action(AgentAction::GoToWorldRoot).unwrap();
        assert_eq!(orchestrator.tree().current(), orchestrator.tree().root());
    }

    #[tokio::test]
    async fn test_rejected_arc_leaves_graph_unchanged() {
        let mut config = create_test_config(10, 3);
        config.generation.duplicate_id_policy = DuplicateIdPolicy::Reject;
        let mut orchestrator = create_test_orchestrator(config);
        orchestrator.initialize().await.unwrap();
        let root_id = orchestrator.graph().root_id().unwrap().to_string();
        let situations = orchestrator.graph().len();
        let nodes = orchestrator.tree().len();
        let root_choices = orchestrator.graph().get(&root_id).unwrap().choices.len();

        let result = orchestrator.apply_action(AgentAction::CreateArc {
            seed: ArcSeed::new("Echo"),
            root: Situation::new(root_id.clone(), "Same id as the world root"),
        });

        assert!(matches!(result, Err(DomainError::DuplicateId(_))));
        assert_eq!(orchestrator.graph().arcs().count(), 1);
        assert_eq!(orchestrator.graph().len(), situations);
        assert_eq!(orchestrator.tree().len(), nodes);
        assert_eq!(orchestrator.graph().get(&root_id).unwrap().choices.len(), root_choices);
    }

    #[tokio::test]
    async fn test_create_arc_avoids_taken_entry_choice() {
        let mut orchestrator = create_test_orchestrator(create_test_config(10, 3));
        orchestrator.initialize().await.unwrap();
        let root_id = orchestrator.graph().root_id().unwrap().to_string();
        orchestrator
            .apply_action(AgentAction::CreateChoices {
                choices: vec![Choice::new("enter_arc_2", "Taken", ChoiceCategory::Movement)],
            })
            .unwrap();

        orchestrator
            .apply_action(AgentAction::CreateArc {
                seed: ArcSeed::new("Second Front"),
                root: Situation::new("front", "The front line"),
            })
            .unwrap();

        let root = orchestrator.graph().get(&root_id).unwrap();
        assert!(root.choice("enter_arc_2").unwrap().is_dangling());
        assert_eq!(
            root.choice("enter_arc_2_2").unwrap().next_situation_id.as_deref(),
            Some("front")
        );
        let tree_root = orchestrator.tree().root();
        assert!(orchestrator
            .tree()
            .node(tree_root)
            .unwrap()
            .children
            .contains_key("enter_arc_2_2"));
    }

    #[tokio::test]
    async fn test_create_arc_links_world_root() {
        let mut orchestrator = create_test_orchestrator(create_test_config(10, 3));
        orchestrator.initialize().await.unwrap();
        let root_id = orchestrator.graph().root_id().unwrap().to_string();

        let outcome = orchestrator
            .apply_action(AgentAction::CreateArc {
                seed: ArcSeed::new("Second Front"),
                root: Situation::new("front", "The front line"),
            })
            .unwrap();
        assert!(outcome.mutated);
        assert_eq!(orchestrator.graph().arcs().count(), 2);
        assert!(orchestrator.graph().successors(&root_id).contains(&"front"));

        orchestrator.apply_action(AgentAction::GoToSituation {
            situation_id: "front".to_string(),
        })
        .unwrap();
        orchestrator.apply_action(AgentAction::GoToArcRoot).unwrap();
        assert_eq!(orchestrator.tree().current_node().situation_id.as_deref(), Some("front"));
    }
}
