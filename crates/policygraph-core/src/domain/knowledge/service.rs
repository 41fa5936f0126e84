//! Policy graph service
//!
//! Composition root tying the ingestion pipeline, the snapshot store, the
//! retrieval graph cache and the retriever together.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, IngestionConfig};
use crate::domain::ingestion::{BatchReport, DocumentExtractor, GraphIngestionPipeline, SourceDocument};
use crate::domain::retrieval::{DEFAULT_NODE_BUDGET, GraphCache, HybridRetriever, RetrievalContext};
use crate::error::Result;

use super::edge::RelationType;
use super::graph::{GraphStats, KnowledgeGraph};
use super::node::Node;
use super::snapshot::{DedupReport, GraphSnapshot};
use super::store::{GraphStore, SavedSnapshot, StoredGraphStats};

/// How a rebuild persists its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Merge into the latest snapshot instead of replacing everything
    pub incremental: bool,
    /// Run label deduplication after saving
    pub deduplicate: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            incremental: false,
            deduplicate: true,
        }
    }
}

impl RebuildOptions {
    pub fn from_config(config: &IngestionConfig) -> Self {
        Self {
            deduplicate: config.dedup_after_rebuild,
            ..Self::default()
        }
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }
}

/// Outcome of a rebuild
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub batch: BatchReport,
    /// `None` when no document produced a fragment and nothing was written
    pub saved: Option<SavedSnapshot>,
    pub dedup: Option<DedupReport>,
}

/// Policy knowledge graph service
///
/// Provides high-level operations for:
/// - Rebuilding the stored graph from a batch of documents
/// - Retrieval against the cached latest graph
/// - Exploration (neighbors, relations, paths, components, ego graphs)
/// - Maintenance (statistics, deduplication, export, clear)
pub struct PolicyGraphService<S: GraphStore> {
    store: Arc<S>,
    pipeline: GraphIngestionPipeline,
    retriever: HybridRetriever,
    cache: GraphCache<S>,
    node_budget: usize,
}

impl<S: GraphStore> PolicyGraphService<S> {
    /// Create a service with default pipeline and retriever settings
    pub fn new(store: Arc<S>) -> Self {
        Self {
            cache: GraphCache::new(Arc::clone(&store)),
            store,
            pipeline: GraphIngestionPipeline::default(),
            retriever: HybridRetriever::default(),
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }

    /// Create a service with limits taken from configuration
    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store)
            .with_pipeline(
                GraphIngestionPipeline::new()
                    .with_min_entity_chars(config.ingestion.min_entity_chars),
            )
            .with_retriever(HybridRetriever::from_config(&config.retrieval))
            .with_node_budget(config.retrieval.node_budget)
    }

    pub fn with_pipeline(mut self, pipeline: GraphIngestionPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_retriever(mut self, retriever: HybridRetriever) -> Self {
        self.retriever = retriever;
        self
    }

    /// Default node budget for `retrieve` calls without an explicit one
    pub fn with_node_budget(mut self, node_budget: usize) -> Self {
        self.node_budget = node_budget;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ========== Ingestion ==========

    /// Ingest a batch, persist it and refresh the retrieval cache
    ///
    /// Documents that fail are skipped and listed in the report. A batch in
    /// which every document failed writes nothing. Storage errors propagate.
    pub async fn rebuild(
        &self,
        documents: &[SourceDocument],
        extractor: &dyn DocumentExtractor,
        options: RebuildOptions,
    ) -> Result<RebuildReport> {
        let (graph, batch) = self.pipeline.ingest_batch(documents, extractor).await?;

        if batch.processed == 0 {
            warn!(
                batch_id = %batch.batch_id,
                skipped = batch.skipped_count(),
                "No document was ingested, leaving stored graph untouched"
            );
            return Ok(RebuildReport {
                batch,
                saved: None,
                dedup: None,
            });
        }

        let saved = self
            .store
            .save(&GraphSnapshot::from(graph), options.incremental)
            .await?;

        let dedup = if options.deduplicate {
            Some(self.store.remove_duplicate_nodes().await?)
        } else {
            None
        };

        self.cache.invalidate().await;

        info!(
            batch_id = %batch.batch_id,
            snapshot_id = saved.id,
            incremental = options.incremental,
            removed_duplicates = dedup.as_ref().map_or(0, |d| d.removed_nodes),
            "Graph rebuilt"
        );

        Ok(RebuildReport {
            batch,
            saved: Some(saved),
            dedup,
        })
    }

    // ========== Retrieval ==========

    /// Retrieve context for a query against the latest stored graph
    pub async fn retrieve(&self, query: &str, node_budget: Option<usize>) -> Result<RetrievalContext> {
        let graph = self.cache.get().await?;
        let budget = node_budget.unwrap_or(self.node_budget);
        Ok(self.retriever.retrieve(&graph, query, budget).await)
    }

    /// The cached latest graph, loading it on first use
    pub async fn graph(&self) -> Result<Arc<KnowledgeGraph>> {
        self.cache.get().await
    }

    /// Forget the cached graph; the next read reloads from the store
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    // ========== Maintenance ==========

    /// Stored counts and timestamps, without loading the graph
    pub async fn stats(&self) -> Result<StoredGraphStats> {
        self.store.get_stats().await
    }

    /// Structural statistics of the latest graph
    pub async fn graph_stats(&self) -> Result<GraphStats> {
        Ok(self.cache.get().await?.stats())
    }

    pub async fn remove_duplicate_nodes(&self) -> Result<DedupReport> {
        let report = self.store.remove_duplicate_nodes().await?;
        if report.changed() {
            self.cache.invalidate().await;
        }
        Ok(report)
    }

    /// Latest stored snapshot as written
    pub async fn export(&self) -> Result<Option<GraphSnapshot>> {
        self.store.load().await
    }

    pub async fn clear(&self) -> Result<u64> {
        let deleted = self.store.clear().await?;
        self.cache.invalidate().await;
        Ok(deleted)
    }

    // ========== Exploration ==========

    /// Find a node by id, or failing that by normalized label
    pub async fn find_node(&self, key: &str) -> Result<Option<Node>> {
        let graph = self.cache.get().await?;
        if let Some(node) = graph.get_node(key) {
            return Ok(Some(node.clone()));
        }
        let wanted = Node::normalize_label(key);
        let found = graph
            .nodes()
            .iter()
            .find(|node| Node::normalize_label(&node.label) == wanted)
            .cloned();
        debug!(key = %key, found = found.is_some(), "Looked up node by label");
        Ok(found)
    }

    pub async fn neighbors(&self, id: &str) -> Result<Vec<Node>> {
        let graph = self.cache.get().await?;
        Ok(graph.get_neighbors(id).into_iter().cloned().collect())
    }

    /// Neighbors with the relation type connecting them, optionally filtered
    pub async fn related(
        &self,
        id: &str,
        relation_type: Option<&RelationType>,
    ) -> Result<Vec<(Node, RelationType)>> {
        let graph = self.cache.get().await?;
        Ok(graph
            .get_related(id, relation_type)
            .into_iter()
            .map(|(node, relation)| (node.clone(), relation.clone()))
            .collect())
    }

    /// Nodes along a shortest path, endpoints included
    pub async fn path(&self, from: &str, to: &str) -> Result<Option<Vec<Node>>> {
        let graph = self.cache.get().await?;
        Ok(graph.shortest_path(from, to).map(|ids| {
            ids.iter()
                .filter_map(|id| graph.get_node(id).cloned())
                .collect()
        }))
    }

    pub async fn component(&self, id: &str) -> Result<Vec<Node>> {
        let graph = self.cache.get().await?;
        Ok(graph.connected_component(id).into_iter().cloned().collect())
    }

    pub async fn ego(&self, id: &str, radius: usize) -> Result<KnowledgeGraph> {
        Ok(self.cache.get().await?.ego_graph(id, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingestion::{StaticExtractor, document_node_id};
    use crate::infrastructure::knowledge::SqliteGraphStore;
    use crate::storage::Database;
    use serde_json::json;

    async fn service() -> PolicyGraphService<SqliteGraphStore> {
        let db = Database::in_memory().await.unwrap();
        PolicyGraphService::new(Arc::new(SqliteGraphStore::new(db.pool().clone())))
    }

    fn corpus() -> (StaticExtractor, Vec<SourceDocument>) {
        let extractor = StaticExtractor::new()
            .with_result(
                "1",
                json!({
                    "entities": [
                        {"text": "专项债", "type": "concept"},
                        {"text": "财政部", "type": "authority"}
                    ],
                    "relations": [{"source": "财政部", "target": "专项债", "type": "发布"}]
                }),
            )
            .with_result(
                "2",
                json!({
                    "entities": [{"text": "专项债", "type": "concept"}, {"text": "浙江省", "type": "region"}],
                    "relations": [{"source": "专项债", "target": "浙江省", "type": "适用于"}]
                }),
            );
        let documents = vec![
            SourceDocument::new("1", "文件甲", ""),
            SourceDocument::new("2", "文件乙.pdf", ""),
        ];
        (extractor, documents)
    }

    #[tokio::test]
    async fn test_rebuild_saves_and_deduplicates() {
        let service = service().await;
        let (extractor, documents) = corpus();

        let report = service
            .rebuild(&documents, &extractor, RebuildOptions::default())
            .await
            .unwrap();

        assert_eq!(report.batch.processed, 2);
        let saved = report.saved.unwrap();
        assert_eq!(saved.node_count, 6);
        let dedup = report.dedup.unwrap();
        assert_eq!(dedup.removed_nodes, 1);
        assert_eq!(dedup.node_count, 5);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.node_count, 5);
        assert_eq!(service.graph().await.unwrap().node_count(), 5);
    }

    #[tokio::test]
    async fn test_rebuild_with_no_ingested_documents_writes_nothing() {
        let service = service().await;
        let (extractor, documents) = corpus();
        service
            .rebuild(&documents, &extractor, RebuildOptions::default())
            .await
            .unwrap();

        let report = service
            .rebuild(
                &[SourceDocument::new("9", "文件丙", "")],
                &extractor,
                RebuildOptions::default(),
            )
            .await
            .unwrap();
        assert!(report.saved.is_none());
        assert_eq!(report.batch.skipped_count(), 1);
        assert_eq!(service.stats().await.unwrap().node_count, 5);
    }

    #[tokio::test]
    async fn test_retrieve_sees_rebuilt_graph() {
        let service = service().await;
        assert!(service.retrieve("专项债", None).await.unwrap().is_empty());

        let (extractor, documents) = corpus();
        service
            .rebuild(&documents, &extractor, RebuildOptions::default())
            .await
            .unwrap();

        let context = service.retrieve("专项债", None).await.unwrap();
        assert_eq!(context.matched_nodes.len(), 1);
        assert_eq!(context.document_ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_exploration() {
        let service = service().await;
        let (extractor, documents) = corpus();
        service
            .rebuild(&documents, &extractor, RebuildOptions::default())
            .await
            .unwrap();

        let bond = service.find_node("专项债").await.unwrap().unwrap();
        let doc_a = document_node_id("文件甲");
        assert_eq!(service.find_node(&doc_a).await.unwrap().unwrap().label, "文件甲");
        assert!(service.find_node("文件乙.pdf").await.unwrap().is_some());
        assert!(service.find_node("不存在").await.unwrap().is_none());

        assert_eq!(service.neighbors(&bond.id).await.unwrap().len(), 4);

        let issued = service
            .related(&bond.id, Some(&RelationType::IssuedBy))
            .await
            .unwrap();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].0.label, "财政部");

        let region = service.find_node("浙江省").await.unwrap().unwrap();
        let path = service.path(&doc_a, &region.id).await.unwrap().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[1].id, bond.id);

        assert_eq!(service.component(&bond.id).await.unwrap().len(), 5);
        assert_eq!(service.ego(&region.id, 1).await.unwrap().node_count(), 2);
        assert!(service.neighbors("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_invalidates_cache() {
        let service = service().await;
        let (extractor, documents) = corpus();
        service
            .rebuild(&documents, &extractor, RebuildOptions::default())
            .await
            .unwrap();
        assert!(!service.graph().await.unwrap().is_empty());

        assert_eq!(service.clear().await.unwrap(), 1);
        assert!(service.graph().await.unwrap().is_empty());
        assert!(service.export().await.unwrap().is_none());
    }
}
