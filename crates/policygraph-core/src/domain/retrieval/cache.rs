//! Lazily loaded, explicitly invalidated retrieval graph

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::knowledge::{GraphStore, KnowledgeGraph};
use crate::error::Result;

/// Read-mostly copy of the latest stored graph
///
/// The first `get` loads from the store; later calls share the same
/// `Arc` until `invalidate` is called. A store with no snapshot caches an
/// empty graph.
pub struct GraphCache<S: GraphStore> {
    store: Arc<S>,
    graph: RwLock<Option<Arc<KnowledgeGraph>>>,
}

impl<S: GraphStore> GraphCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            graph: RwLock::new(None),
        }
    }

    /// Cached graph, loading it on first use
    pub async fn get(&self) -> Result<Arc<KnowledgeGraph>> {
        if let Some(graph) = self.graph.read().await.as_ref() {
            return Ok(Arc::clone(graph));
        }

        let mut slot = self.graph.write().await;
        // another task may have loaded while we waited for the write lock
        if let Some(graph) = slot.as_ref() {
            return Ok(Arc::clone(graph));
        }

        let graph = match self.store.load().await? {
            Some(snapshot) => KnowledgeGraph::from(snapshot),
            None => KnowledgeGraph::new(),
        };
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Loaded retrieval graph"
        );
        let graph = Arc::new(graph);
        *slot = Some(Arc::clone(&graph));
        Ok(graph)
    }

    /// Drop the cached graph; the next `get` reloads from the store
    pub async fn invalidate(&self) {
        *self.graph.write().await = None;
        debug!("Retrieval graph cache invalidated");
    }

    pub async fn is_loaded(&self) -> bool {
        self.graph.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{GraphSnapshot, Node, NodeType};
    use crate::infrastructure::knowledge::SqliteGraphStore;
    use crate::storage::Database;

    async fn store() -> Arc<SqliteGraphStore> {
        let db = Database::in_memory().await.unwrap();
        Arc::new(SqliteGraphStore::new(db.pool().clone()))
    }

    fn fragment(id: &str) -> GraphSnapshot {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(Node::new(id, id, NodeType::Concept));
        GraphSnapshot::from(&graph)
    }

    #[tokio::test]
    async fn test_empty_store_caches_empty_graph() {
        let cache = GraphCache::new(store().await);
        assert!(!cache.is_loaded().await);
        assert!(cache.get().await.unwrap().is_empty());
        assert!(cache.is_loaded().await);
    }

    #[tokio::test]
    async fn test_cache_until_invalidated() {
        let store = store().await;
        let cache = GraphCache::new(Arc::clone(&store));
        store.save(&fragment("a"), false).await.unwrap();

        let first = cache.get().await.unwrap();
        assert_eq!(first.node_count(), 1);

        store.save(&fragment("b"), true).await.unwrap();
        let cached = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &cached));
        assert_eq!(cached.node_count(), 1);

        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap().node_count(), 2);
    }
}
