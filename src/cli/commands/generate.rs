//! `reforge generate`: run a full generation offline.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::output::progress::{create_spinner, ProgressBarExt};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, WorldContext, WorldSeed};
use crate::domain::ports::{NullSnapshotStore, SnapshotStore};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::generators::ScriptedGenerator;
use crate::infrastructure::persistence::JsonSnapshotStore;
use crate::services::orchestrator::GenerationOrchestrator;
use crate::services::report::GenerationReport;

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// World name; also names the run directory
    #[arg(long, default_value = "Unnamed World")]
    pub seed_name: String,

    /// World theme (repeatable)
    #[arg(long = "theme")]
    pub themes: Vec<String>,

    /// Stop expanding at this many situations
    #[arg(short, long)]
    pub target: Option<usize>,

    /// Depth beyond which choices are not expanded
    #[arg(short = 'd', long)]
    pub max_depth: Option<u32>,

    /// Choices offered by every scripted situation
    #[arg(long, default_value = "2")]
    pub choices: usize,

    /// Extra YAML config merged below environment variables
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory that receives the run's snapshot folder
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Do not write snapshots
    #[arg(long)]
    pub no_snapshots: bool,

    /// Seed for the cycle injection policy
    #[arg(long)]
    pub cycle_seed: Option<u64>,
}

impl GenerateArgs {
    /// Fold command line overrides into `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(target) = self.target {
            config.generation.target_situations = target;
        }
        if let Some(depth) = self.max_depth {
            config.generation.max_depth = depth;
        }
        if let Some(dir) = &self.snapshot_dir {
            config.snapshots.directory = dir.clone();
        }
        if self.no_snapshots {
            config.snapshots.enabled = false;
        }
        if self.cycle_seed.is_some() {
            config.cycles.seed = self.cycle_seed;
        }
    }

    fn world_seed(&self) -> WorldSeed {
        let mut seed = WorldSeed::new(self.seed_name.clone());
        seed.themes = self.themes.clone();
        seed
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateOutput {
    pub seed_name: String,
    pub run_dir: Option<PathBuf>,
    pub report: GenerationReport,
}

impl CommandOutput for GenerateOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut lines = vec![format!("Generated \"{}\"", self.seed_name)];
        if let Some(dir) = &self.run_dir {
            lines.push(format!("Snapshots: {}", dir.display()));
        }
        lines.push(formatter.format_report(&self.report));
        if !self.report.failures.is_empty() {
            lines.push(format!("{} failed request(s):", self.report.failures.len()));
            lines.push(formatter.format_failures(&self.report.failures));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: GenerateArgs, json_mode: bool) -> Result<()> {
    let mut config = ConfigLoader::load_layered(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    ConfigLoader::validate(&config).context("Invalid configuration after overrides")?;
    let _logger = crate::cli::init_logging(&config)?;

    let spinner = create_spinner(format!("Generating {}...", args.seed_name), json_mode);
    match run(&args, config).await {
        Ok(result) => {
            spinner.finish_success(format!(
                "{} situations in {} steps",
                result.report.situation_count, result.report.generation_step
            ));
            output(&result, json_mode);
            Ok(())
        }
        Err(err) => {
            spinner.finish_error("generation failed");
            Err(err)
        }
    }
}

/// Run one generation with `config`, cancelling cleanly on Ctrl-C.
pub async fn run(args: &GenerateArgs, config: Config) -> Result<GenerateOutput> {
    let seed = args.world_seed();
    let (store, run_dir): (Arc<dyn SnapshotStore>, Option<PathBuf>) = if config.snapshots.enabled {
        let store = JsonSnapshotStore::new(&config.snapshots.directory, &seed);
        let dir = store.run_dir().to_path_buf();
        (Arc::new(store), Some(dir))
    } else {
        (Arc::new(NullSnapshotStore), None)
    };

    let generator = Arc::new(ScriptedGenerator::new(args.choices));
    let mut orchestrator =
        GenerationOrchestrator::new(config, generator, store, WorldContext::new(seed));

    let handle = orchestrator.cancellation_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            handle.cancel();
        }
    });

    let report = orchestrator.run().await;
    watcher.abort();
    let report = report.context("Generation failed")?;

    Ok(GenerateOutput {
        seed_name: args.seed_name.clone(),
        run_dir,
        report,
    })
}
