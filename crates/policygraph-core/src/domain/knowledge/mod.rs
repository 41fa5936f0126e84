//! Policy knowledge graph domain module
//!
//! Policy documents and the entities they mention (authorities, regions,
//! concepts, projects) form an undirected, typed multigraph:
//!
//! - **Model**: [`Node`], [`Edge`] and [`KnowledgeGraph`] with traversal,
//!   path, component and statistics queries
//! - **Persistence boundary**: [`GraphSnapshot`], the flat `nodes`/`edges`
//!   JSON document with `from`/`to` endpoints and style hints
//! - **Storage**: the [`GraphStore`] trait (SQLite implementation in
//!   `infrastructure::knowledge`)
//! - **Composition root**: [`PolicyGraphService`] wires ingestion, storage,
//!   caching and retrieval together
//!
//! ## Architecture
//!
//! ```text
//! SourceDocument → DocumentExtractor → GraphIngestionPipeline → fragment
//!                                                                  ↓
//!                        GraphStore.save (full | incremental) + dedup
//!                                                                  ↓
//! query → mentions → EntityResolver → SubgraphBuilder → RetrievalContext
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use policygraph_core::prelude::*;
//!
//! let service = PolicyGraphService::new(Arc::new(SqliteGraphStore::new(pool)));
//! let report = service.rebuild(&documents, &extractor, RebuildOptions::default()).await?;
//! let context = service.retrieve("财政部 专项债", None).await?;
//! println!("documents: {:?}", context.document_ids);
//! ```

mod edge;
mod graph;
mod node;
mod service;
mod snapshot;
mod store;
mod style;

pub use edge::{Edge, RelationType};
pub use graph::{GraphStats, KnowledgeGraph};
pub use node::{Attributes, Node, NodeType};
pub use service::{PolicyGraphService, RebuildOptions, RebuildReport};
pub use snapshot::{DedupReport, GraphSnapshot, SnapshotEdge, SnapshotNode};
pub use store::{GraphStore, SavedSnapshot, StoredGraphStats};
pub use style::{NodeStyle, relation_color};
