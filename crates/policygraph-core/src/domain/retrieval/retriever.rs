//! Graph-grounded retrieval
//!
//! Query → mentions → resolved seed nodes → budgeted subgraph → document ids
//! and relation triples for a generation collaborator.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::domain::knowledge::{KnowledgeGraph, NodeType};

use super::mentions::{DEFAULT_MAX_MENTIONS, MentionExtractor, fallback_mentions};
use super::resolver::{EntityMatch, EntityResolver};
use super::subgraph::SubgraphBuilder;

/// Default cap on relation triples in a context
pub const DEFAULT_MAX_RELATIONS: usize = 20;

/// A relation rendered with node labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationTriple {
    pub source: String,
    pub relation: String,
    pub target: String,
}

/// What retrieval hands to generation and visualization collaborators
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalContext {
    /// Documents behind the policy nodes in the subgraph, first-seen order
    pub document_ids: Vec<String>,
    pub subgraph: Option<KnowledgeGraph>,
    pub relations: Vec<RelationTriple>,
    /// Seed node ids the query resolved to
    pub matched_nodes: Vec<String>,
    pub mentions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<EntityMatch>,
}

impl RetrievalContext {
    /// Context with nothing found
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subgraph.is_none() && self.document_ids.is_empty() && self.relations.is_empty()
    }
}

/// Combines mention extraction, entity resolution and subgraph expansion
#[derive(Clone)]
pub struct HybridRetriever {
    mention_extractor: Option<Arc<dyn MentionExtractor>>,
    resolver: EntityResolver,
    builder: SubgraphBuilder,
    max_relations: usize,
    max_mentions: usize,
}

impl Default for HybridRetriever {
    fn default() -> Self {
        Self {
            mention_extractor: None,
            resolver: EntityResolver::default(),
            builder: SubgraphBuilder,
            max_relations: DEFAULT_MAX_RELATIONS,
            max_mentions: DEFAULT_MAX_MENTIONS,
        }
    }
}

impl HybridRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits from configuration; the mention extractor is attached separately
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::default()
            .with_max_relations(config.max_relations)
            .with_max_mentions(config.max_mentions)
    }

    pub fn with_mention_extractor(mut self, extractor: Arc<dyn MentionExtractor>) -> Self {
        self.mention_extractor = Some(extractor);
        self
    }

    pub fn with_resolver(mut self, resolver: EntityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_max_relations(mut self, max_relations: usize) -> Self {
        self.max_relations = max_relations;
        self
    }

    pub fn with_max_mentions(mut self, max_mentions: usize) -> Self {
        self.max_mentions = max_mentions;
        self
    }

    pub fn has_mention_extractor(&self) -> bool {
        self.mention_extractor.is_some()
    }

    /// Mentions for a query, falling back to the CJK heuristic when the
    /// extractor is missing, fails, or finds nothing
    pub async fn mentions(&self, query: &str) -> Vec<String> {
        if let Some(extractor) = &self.mention_extractor {
            match extractor.extract_mentions(query).await {
                Ok(mut mentions) if !mentions.is_empty() => {
                    mentions.truncate(self.max_mentions);
                    return mentions;
                }
                Ok(_) => debug!("Mention extractor returned nothing, using fallback"),
                Err(e) => warn!(error = %e, "Mention extraction failed, using fallback"),
            }
        }
        fallback_mentions(query, self.max_mentions)
    }

    /// Retrieve the context for a query against `graph`
    ///
    /// Never fails: an empty graph, a query without mentions, or mentions
    /// that resolve to nothing all produce an empty context.
    pub async fn retrieve(
        &self,
        graph: &KnowledgeGraph,
        query: &str,
        node_budget: usize,
    ) -> RetrievalContext {
        if graph.is_empty() {
            debug!("Graph is empty, nothing to retrieve");
            return RetrievalContext::empty();
        }

        let mentions = self.mentions(query).await;
        if mentions.is_empty() {
            debug!(query = %query, "No mentions in query");
            return RetrievalContext::empty();
        }

        let resolution = self.resolver.resolve(graph, &mentions);
        if resolution.is_empty() {
            debug!(?mentions, "Mentions did not resolve to any node");
            return RetrievalContext {
                mentions,
                ..RetrievalContext::empty()
            };
        }

        let subgraph = self.builder.build(graph, &resolution.node_ids, node_budget);
        let document_ids = document_ids(&subgraph);
        let relations = self.relation_triples(&subgraph);

        info!(
            mentions = mentions.len(),
            matched = resolution.node_ids.len(),
            nodes = subgraph.node_count(),
            edges = subgraph.edge_count(),
            documents = document_ids.len(),
            "Retrieved subgraph"
        );

        RetrievalContext {
            document_ids,
            subgraph: Some(subgraph),
            relations,
            matched_nodes: resolution.node_ids,
            mentions,
            matches: resolution.matches,
        }
    }

    fn relation_triples(&self, subgraph: &KnowledgeGraph) -> Vec<RelationTriple> {
        subgraph
            .edges()
            .iter()
            .filter_map(|edge| {
                let source = subgraph.get_node(&edge.source_id)?;
                let target = subgraph.get_node(&edge.target_id)?;
                Some(RelationTriple {
                    source: source.label.clone(),
                    relation: edge.label.clone(),
                    target: target.label.clone(),
                })
            })
            .take(self.max_relations)
            .collect()
    }
}

fn document_ids(subgraph: &KnowledgeGraph) -> Vec<String> {
    let mut seen = HashSet::new();
    subgraph
        .nodes()
        .iter()
        .filter(|node| node.node_type == NodeType::Policy)
        .filter_map(|node| node.document_reference())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
