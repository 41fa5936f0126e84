//! SQLite implementation of the GraphStore
//!
//! Snapshots live in the `knowledge_graph` table as JSON text, one row per
//! snapshot, with node/edge counts and timestamps kept beside the body so
//! statistics never need to deserialize it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::domain::knowledge::{
    DedupReport, GraphSnapshot, GraphStore, SavedSnapshot, StoredGraphStats,
};
use crate::error::{Error, Result};

/// SQLite implementation of the graph snapshot store
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Create a new SQLite graph store on a migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of snapshot rows, including history
    pub async fn snapshot_count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM knowledge_graph")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn save(&self, fragment: &GraphSnapshot, incremental: bool) -> Result<SavedSnapshot> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        let (body, created_at) = if incremental {
            match latest_snapshot(&mut tx).await? {
                Some(row) => {
                    let created_at = row.created_at.clone();
                    let existing = row.into_snapshot()?;
                    debug!(
                        existing_nodes = existing.node_count(),
                        incoming_nodes = fragment.node_count(),
                        "Merging fragment into latest snapshot"
                    );
                    (existing.merge(fragment.clone()), created_at)
                }
                None => (fragment.clone(), now.clone()),
            }
        } else {
            let deleted = sqlx::query("DELETE FROM knowledge_graph")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!(deleted, "Replacing stored snapshots");
            (fragment.clone(), now.clone())
        };

        let graph_data = serde_json::to_string(&body)?;
        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_graph (graph_data, node_count, edge_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&graph_data)
        .bind(body.node_count() as i64)
        .bind(body.edge_count() as i64)
        .bind(&created_at)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let saved = SavedSnapshot {
            id: result.last_insert_rowid(),
            node_count: body.node_count(),
            edge_count: body.edge_count(),
            incremental,
        };
        info!(
            snapshot_id = saved.id,
            nodes = saved.node_count,
            edges = saved.edge_count,
            incremental,
            "Graph snapshot saved"
        );
        Ok(saved)
    }

    async fn load(&self) -> Result<Option<GraphSnapshot>> {
        let mut conn = self.pool.acquire().await?;
        latest_snapshot(&mut conn)
            .await?
            .map(SnapshotRow::into_snapshot)
            .transpose()
    }

    async fn get_stats(&self) -> Result<StoredGraphStats> {
        let row: Option<MetaRow> = sqlx::query_as(
            r#"
            SELECT node_count, edge_count, created_at, updated_at
            FROM knowledge_graph
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MetaRow::into_stats).unwrap_or_default())
    }

    async fn remove_duplicate_nodes(&self) -> Result<DedupReport> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = latest_snapshot(&mut tx).await? else {
            debug!("No snapshot to deduplicate");
            return Ok(DedupReport::default());
        };
        let id = row.id;
        let mut snapshot = row.into_snapshot()?;
        let report = snapshot.deduplicate();

        if report.changed() {
            sqlx::query(
                r#"
                UPDATE knowledge_graph
                SET graph_data = ?, node_count = ?, edge_count = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(serde_json::to_string(&snapshot)?)
            .bind(report.node_count as i64)
            .bind(report.edge_count as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            info!(
                snapshot_id = id,
                removed_nodes = report.removed_nodes,
                removed_edges = report.removed_edges,
                "Removed duplicate nodes"
            );
        } else {
            tx.rollback().await?;
            debug!(snapshot_id = id, "No duplicate nodes found");
        }

        Ok(report)
    }

    async fn clear(&self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM knowledge_graph")
            .execute(&self.pool)
            .await?
            .rows_affected();
        info!(deleted, "Cleared stored graph snapshots");
        Ok(deleted)
    }
}

async fn latest_snapshot(conn: &mut SqliteConnection) -> Result<Option<SnapshotRow>> {
    let row = sqlx::query_as(
        "SELECT id, graph_data, created_at FROM knowledge_graph ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

// ========== Row Types ==========

#[derive(FromRow)]
struct SnapshotRow {
    id: i64,
    graph_data: String,
    created_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<GraphSnapshot> {
        serde_json::from_str(&self.graph_data)
            .map_err(|e| Error::SnapshotCorrupted(format!("snapshot {}: {}", self.id, e)))
    }
}

#[derive(FromRow)]
struct MetaRow {
    node_count: i64,
    edge_count: i64,
    created_at: String,
    updated_at: String,
}

impl MetaRow {
    fn into_stats(self) -> StoredGraphStats {
        StoredGraphStats {
            node_count: self.node_count.max(0) as usize,
            edge_count: self.edge_count.max(0) as usize,
            created_at: parse_timestamp(&self.created_at),
            last_updated: parse_timestamp(&self.updated_at),
        }
    }
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Edge, KnowledgeGraph, Node, NodeType, RelationType};
    use crate::storage::Database;

    async fn setup_store() -> SqliteGraphStore {
        let db = Database::in_memory()
            .await
            .expect("Failed to create in-memory database");
        SqliteGraphStore::new(db.pool().clone())
    }

    fn fragment(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> GraphSnapshot {
        let mut graph = KnowledgeGraph::new();
        for (id, label) in nodes {
            graph.add_node(Node::new(*id, *label, NodeType::Concept));
        }
        for (from, to) in edges {
            graph.add_edge(Edge::new(*from, *to, RelationType::RelatesTo));
        }
        GraphSnapshot::from(&graph)
    }

    #[tokio::test]
    async fn test_load_empty_store() {
        let store = setup_store().await;
        assert!(store.load().await.unwrap().is_none());

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.node_count, 0);
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn test_full_save_replaces_history() {
        let store = setup_store().await;
        store
            .save(&fragment(&[("a", "甲")], &[]), false)
            .await
            .unwrap();
        store
            .save(&fragment(&[("b", "乙"), ("c", "丙")], &[("b", "c")]), false)
            .await
            .unwrap();

        assert_eq!(store.snapshot_count().await.unwrap(), 1);
        let loaded = store.load().await.unwrap().unwrap();
        let ids: Vec<&str> = loaded.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_incremental_save_merges_and_keeps_history() {
        let store = setup_store().await;
        store
            .save(&fragment(&[("A", "v1"), ("C", "丙")], &[("A", "C")]), false)
            .await
            .unwrap();
        let saved = store
            .save(&fragment(&[("A", "v2"), ("B", "乙")], &[("A", "B")]), true)
            .await
            .unwrap();

        assert!(saved.incremental);
        assert_eq!(saved.node_count, 3);
        assert_eq!(saved.edge_count, 2);
        assert_eq!(store.snapshot_count().await.unwrap(), 2);

        let loaded = store.load().await.unwrap().unwrap();
        let labels: Vec<(&str, &str)> = loaded
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.label.as_str()))
            .collect();
        assert_eq!(labels, vec![("A", "v2"), ("C", "丙"), ("B", "乙")]);
    }

    #[tokio::test]
    async fn test_incremental_save_into_empty_store() {
        let store = setup_store().await;
        let saved = store
            .save(&fragment(&[("a", "甲")], &[]), true)
            .await
            .unwrap();
        assert_eq!(saved.node_count, 1);
        assert_eq!(store.load().await.unwrap().unwrap().node_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_duplicate_nodes_is_idempotent() {
        let store = setup_store().await;
        store
            .save(
                &fragment(
                    &[("d1", "文件甲.pdf"), ("d2", "文件甲"), ("e", "专项债")],
                    &[("d1", "e"), ("d2", "e")],
                ),
                false,
            )
            .await
            .unwrap();

        let first = store.remove_duplicate_nodes().await.unwrap();
        assert_eq!(first.removed_nodes, 1);
        assert_eq!(first.removed_edges, 1);

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);

        let second = store.remove_duplicate_nodes().await.unwrap();
        assert!(!second.changed());
        assert_eq!(second.node_count, first.node_count);
        assert_eq!(second.edge_count, first.edge_count);
    }

    #[tokio::test]
    async fn test_remove_duplicates_on_empty_store() {
        let store = setup_store().await;
        let report = store.remove_duplicate_nodes().await.unwrap();
        assert_eq!(report, DedupReport::default());
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_is_reported() {
        let store = setup_store().await;
        sqlx::query("INSERT INTO knowledge_graph (graph_data, created_at, updated_at) VALUES ('{not json', '', '')")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::SnapshotCorrupted(_)));
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = setup_store().await;
        store.save(&fragment(&[("a", "甲")], &[]), false).await.unwrap();
        store.save(&fragment(&[("b", "乙")], &[]), true).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.load().await.unwrap().is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01T08:30:00+00:00").is_some());
        assert!(parse_timestamp("2024-05-01 08:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
