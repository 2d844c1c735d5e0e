use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::errors::DomainResult;
use crate::domain::models::Snapshot;

/// Port for persisting one snapshot per generation step
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot. Returns where it was written, if anywhere.
    async fn save(&self, snapshot: &Snapshot) -> DomainResult<Option<PathBuf>>;
}

/// Store that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSnapshotStore;

#[async_trait]
impl SnapshotStore for NullSnapshotStore {
    async fn save(&self, _snapshot: &Snapshot) -> DomainResult<Option<PathBuf>> {
        Ok(None)
    }
}
