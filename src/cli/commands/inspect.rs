//! `reforge inspect`: diagnostics for a persisted snapshot.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, Situation};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::persistence::{load_snapshot, resolve_snapshot_path};
use crate::services::connectivity::{ConnectivityAnalyzer, ConnectivityReport, UNREACHABLE_DISTANCE};
use crate::services::cycle_manager::{CycleManager, SoftLock};

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Snapshot file, or a run directory to use its latest snapshot
    pub snapshot: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct InspectOutput {
    pub snapshot: PathBuf,
    pub generation_step: u32,
    pub step_name: String,
    pub situation_count: usize,
    pub arc_count: usize,
    pub root_situation_id: Option<String>,
    pub connectivity: ConnectivityReport,
    pub soft_locks: Vec<SoftLock>,
    pub incomplete: Vec<Situation>,
}

impl CommandOutput for InspectOutput {
    fn to_human(&self) -> String {
        let distance = if self.connectivity.distance_to_complete >= UNREACHABLE_DISTANCE {
            "unreachable".to_string()
        } else {
            self.connectivity.distance_to_complete.to_string()
        };
        let mut lines = vec![
            format!("Snapshot: {}", self.snapshot.display()),
            format!("Step {} ({})", self.generation_step, self.step_name),
            format!(
                "{} situations in {} arc(s), root {}",
                self.situation_count,
                self.arc_count,
                self.root_situation_id.as_deref().unwrap_or("-")
            ),
            format!(
                "Incomplete situations: {}  Dangling choices: {}  Distance to complete: {distance}",
                self.connectivity.incomplete_situations, self.connectivity.dead_end_choices
            ),
        ];
        if !self.connectivity.unreachable.is_empty() {
            lines.push(format!(
                "Unreachable from root: {}",
                self.connectivity.unreachable.join(", ")
            ));
        }
        for lock in &self.soft_locks {
            lines.push(format!("Soft-lock: {}", lock.members.join(" -> ")));
        }
        if !self.incomplete.is_empty() {
            let refs: Vec<&Situation> = self.incomplete.iter().collect();
            lines.push(TableFormatter::new().format_incomplete(&refs));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: InspectArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let _logger = crate::cli::init_logging(&config)?;
    let result = inspect(&args, &config).await?;
    output(&result, json_mode);
    Ok(())
}

pub async fn inspect(args: &InspectArgs, config: &Config) -> Result<InspectOutput> {
    let path = resolve_snapshot_path(&args.snapshot)
        .await
        .with_context(|| format!("No snapshot at {}", args.snapshot.display()))?;
    let snapshot = load_snapshot(&path)
        .await
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let graph = snapshot
        .to_graph_with_policy(config.generation.duplicate_id_policy)
        .context("Snapshot does not describe a valid graph")?;

    let connectivity = ConnectivityAnalyzer::new().report(&graph, None);
    let soft_locks = CycleManager::new(config.cycles.clone()).detect_soft_locks(&graph);
    let incomplete = graph
        .situations()
        .filter(|s| !s.is_complete())
        .cloned()
        .collect();

    Ok(InspectOutput {
        snapshot: path,
        generation_step: snapshot.generation_step,
        step_name: snapshot.step_name.clone(),
        situation_count: graph.len(),
        arc_count: graph.arcs().count(),
        root_situation_id: graph.root_id().map(str::to_string),
        connectivity,
        soft_locks,
        incomplete,
    })
}
