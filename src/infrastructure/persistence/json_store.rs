use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Snapshot, WorldSeed};
use crate::domain::ports::SnapshotStore;

const SNAPSHOT_PREFIX: &str = "step_";

/// Writes one pretty-printed JSON file per generation step
///
/// Files live in `<base>/<seed-slug>_<YYYYMMDD_HHMMSS>/` and are named
/// `step_<NNNNNN>_<step_name>.json`. Listing orders files by the parsed step
/// number, so runs longer than the padding still list in step order.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    run_dir: PathBuf,
}

impl JsonSnapshotStore {
    /// Store for a new run of `seed` started now.
    pub fn new(base_dir: impl AsRef<Path>, seed: &WorldSeed) -> Self {
        Self::started_at(base_dir, seed, Utc::now())
    }

    pub fn started_at(base_dir: impl AsRef<Path>, seed: &WorldSeed, started: DateTime<Utc>) -> Self {
        let run_name = format!("{}_{}", seed.slug(), started.format("%Y%m%d_%H%M%S"));
        Self {
            run_dir: base_dir.as_ref().join(run_name),
        }
    }

    /// Store writing straight into `run_dir`.
    pub fn in_dir(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn file_name(snapshot: &Snapshot) -> String {
        let step_name: String = snapshot
            .step_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        format!("{SNAPSHOT_PREFIX}{:06}_{step_name}.json", snapshot.generation_step)
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> DomainResult<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.run_dir).await.map_err(|e| {
            DomainError::PersistenceError(format!(
                "failed to create {}: {e}",
                self.run_dir.display()
            ))
        })?;

        let path = self.run_dir.join(Self::file_name(snapshot));
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            DomainError::PersistenceError(format!("failed to write {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), step = snapshot.generation_step, "wrote snapshot");
        Ok(Some(path))
    }
}

/// Read one snapshot file.
pub async fn load_snapshot(path: impl AsRef<Path>) -> DomainResult<Snapshot> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        DomainError::PersistenceError(format!("failed to read {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Snapshot files in `run_dir`, in step order.
pub async fn list_snapshots(run_dir: impl AsRef<Path>) -> DomainResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(run_dir.as_ref()).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_snapshot = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SNAPSHOT_PREFIX) && n.ends_with(".json"));
        if is_snapshot {
            paths.push(path);
        }
    }
    paths.sort_by_cached_key(|path| (step_of(path), path.clone()));
    Ok(paths)
}

/// Step number encoded in a snapshot file name.
fn step_of(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?.strip_prefix(SNAPSHOT_PREFIX)?;
    let digits = name.split('_').next()?;
    digits.parse().ok()
}

/// Last snapshot written to `run_dir`, if any.
pub async fn latest_snapshot(run_dir: impl AsRef<Path>) -> DomainResult<Option<PathBuf>> {
    Ok(list_snapshots(run_dir).await?.pop())
}

/// Accept either a snapshot file or a run directory; directories resolve to
/// their latest snapshot.
pub async fn resolve_snapshot_path(path: impl AsRef<Path>) -> DomainResult<PathBuf> {
    let path = path.as_ref();
    if tokio::fs::metadata(path).await?.is_dir() {
        latest_snapshot(path).await?.ok_or_else(|| {
            DomainError::PersistenceError(format!("no snapshots in {}", path.display()))
        })
    } else {
        Ok(path.to_path_buf())
    }
}
