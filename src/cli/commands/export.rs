//! `reforge export`: Mermaid flowchart of a snapshot.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::export::render_mermaid;
use crate::infrastructure::persistence::{load_snapshot, resolve_snapshot_path};

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Snapshot file, or a run directory to use its latest snapshot
    pub snapshot: PathBuf,

    /// Write the chart here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ExportOutput {
    pub snapshot: PathBuf,
    pub output: Option<PathBuf>,
    pub situation_count: usize,
    pub chart: String,
}

impl CommandOutput for ExportOutput {
    fn to_human(&self) -> String {
        match &self.output {
            Some(path) => format!(
                "Wrote {} situations to {}",
                self.situation_count,
                path.display()
            ),
            None => self.chart.clone(),
        }
    }
}

pub async fn execute(args: ExportArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let _logger = crate::cli::init_logging(&config)?;
    let result = export(&args).await?;
    output(&result, json_mode);
    Ok(())
}

pub async fn export(args: &ExportArgs) -> Result<ExportOutput> {
    let path = resolve_snapshot_path(&args.snapshot)
        .await
        .with_context(|| format!("No snapshot at {}", args.snapshot.display()))?;
    let snapshot = load_snapshot(&path)
        .await
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let chart = render_mermaid(&snapshot);

    if let Some(target) = &args.output {
        tokio::fs::write(target, &chart)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        tracing::info!(path = %target.display(), "wrote mermaid chart");
    }

    Ok(ExportOutput {
        snapshot: path,
        output: args.output.clone(),
        situation_count: snapshot.situation_count(),
        chart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Choice, ChoiceCategory, PlayerState, Situation, WorldContext};
    use crate::domain::ports::SnapshotStore;
    use crate::infrastructure::persistence::JsonSnapshotStore;
    use crate::services::content_graph::ContentGraph;
    use crate::services::snapshot::capture_snapshot;
    use crate::services::state_tree::{StateTree, StateTreeNode};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_export_to_file() {
        let dir = TempDir::new().unwrap();
        let mut graph = ContentGraph::new();
        graph
            .insert(
                Situation::new("root", "Start")
                    .with_choice(Choice::new("go", "Go on", ChoiceCategory::Movement)),
            )
            .unwrap();
        graph.insert(Situation::new("next", "Later")).unwrap();
        graph.resolve("root", "go", "next").unwrap();
        let tree = StateTree::new(StateTreeNode::new(WorldContext::default(), None, None, 0));
        let snapshot = capture_snapshot(&graph, &tree, &PlayerState::new("p"), 1, "expand_next");
        let saved = JsonSnapshotStore::in_dir(dir.path())
            .save(&snapshot)
            .await
            .unwrap()
            .unwrap();

        let target = dir.path().join("graph.mmd");
        let result = export(&ExportArgs {
            snapshot: saved,
            output: Some(target.clone()),
        })
        .await
        .unwrap();

        assert_eq!(result.situation_count, 2);
        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, result.chart);
        assert!(written.contains("root -->|\"Go on\"| next"));
        assert!(result.to_human().starts_with("Wrote 2 situations"));
    }
}
