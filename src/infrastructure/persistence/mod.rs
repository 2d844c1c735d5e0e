//! Snapshot persistence
//!
//! One JSON document per generation step, grouped by run directory.

pub mod json_store;

pub use json_store::{
    latest_snapshot, list_snapshots, load_snapshot, resolve_snapshot_path, JsonSnapshotStore,
};
