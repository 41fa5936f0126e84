//! Storage trait for graph snapshots
//!
//! A store holds the serialized graph of one corpus. The newest snapshot is
//! the live graph; incremental saves merge into it and leave the previous
//! snapshot behind as history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

use super::snapshot::{DedupReport, GraphSnapshot};

/// Repository trait for graph snapshot persistence
///
/// Each call is atomic on its own. Incremental saves read the latest snapshot
/// and write a merged one, so two writers saving incrementally at the same
/// time can lose each other's fragment; callers serialize rebuilds.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Persist a graph fragment
    ///
    /// With `incremental == false` the fragment replaces every stored
    /// snapshot. Otherwise it is merged over the latest snapshot
    /// (see [`GraphSnapshot::merge`]) and stored as a new one.
    async fn save(&self, fragment: &GraphSnapshot, incremental: bool) -> Result<SavedSnapshot>;

    /// Latest snapshot, or `None` if nothing was saved
    async fn load(&self) -> Result<Option<GraphSnapshot>>;

    /// Counts and timestamps of the latest snapshot, read from row metadata
    async fn get_stats(&self) -> Result<StoredGraphStats>;

    /// Collapse label duplicates in the latest snapshot
    ///
    /// Only writes when node or edge counts changed.
    async fn remove_duplicate_nodes(&self) -> Result<DedupReport>;

    /// Delete every stored snapshot; returns the number removed
    async fn clear(&self) -> Result<u64>;
}

/// Result of a successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedSnapshot {
    /// Row id of the snapshot now considered latest
    pub id: i64,
    pub node_count: usize,
    pub edge_count: usize,
    pub incremental: bool,
}

/// Metadata of the latest stored snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoredGraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoredGraphStats {
    pub fn is_empty(&self) -> bool {
        self.last_updated.is_none()
    }
}
