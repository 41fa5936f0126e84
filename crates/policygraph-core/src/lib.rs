//! Policygraph Core Library
//!
//! This crate provides the core functionality for policygraph, including:
//! - Typed knowledge graph model and graph algorithms
//! - Snapshot persistence with full-replace and incremental-merge saves
//! - Per-document ingestion of extraction results into graph fragments
//! - Graph-grounded retrieval (entity resolution + budgeted subgraph expansion)
//! - Storage (SQLite with versioned migrations)
//! - LLM integration (OpenAI-compatible chat completions) for extraction collaborators

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::ingestion::{BatchReport, GraphIngestionPipeline, SourceDocument};
    pub use crate::domain::knowledge::{
        Edge, GraphSnapshot, GraphStore, KnowledgeGraph, Node, NodeType, PolicyGraphService,
        RebuildOptions, RelationType,
    };
    pub use crate::domain::retrieval::{HybridRetriever, RetrievalContext};
    pub use crate::error::{Error, Result};
    pub use crate::infrastructure::knowledge::SqliteGraphStore;
}
