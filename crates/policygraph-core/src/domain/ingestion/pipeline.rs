//! Document-to-fragment ingestion
//!
//! Each document becomes one fragment: a `Policy` node for the document, a
//! node per distinct entity mention with a `Contains` edge from the document,
//! and typed edges for relations whose endpoints resolve inside the same
//! document. Entities are not unified across documents here; label
//! deduplication in the store does that afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::knowledge::{
    Edge, KnowledgeGraph, Node, NodeType, RelationType, relation_color,
};
use crate::error::{Error, Result};

use super::extraction::{DocumentExtractor, RawExtraction, SourceDocument};

/// Hex characters of the SHA-256 digest used in node ids
const ID_HASH_LEN: usize = 16;

/// Default minimum length of an entity mention, in characters
pub const DEFAULT_MIN_ENTITY_CHARS: usize = 2;

/// Id of the node representing a document with this normalized title
pub fn document_node_id(normalized_title: &str) -> String {
    format!("doc_{}", short_hash(normalized_title))
}

/// Id of an entity node mentioned in the document with this normalized title
pub fn entity_node_id(normalized_title: &str, text: &str) -> String {
    format!("ent_{}", short_hash(&format!("{normalized_title}::{text}")))
}

fn short_hash(input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..ID_HASH_LEN].to_string()
}

/// Per-document ingestion counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FragmentStats {
    pub entities_added: usize,
    /// Mentions too short or already seen in the same document
    pub entities_skipped: usize,
    pub contains_edges: usize,
    pub relations_added: usize,
    /// Relations with an unresolved or self-referencing endpoint
    pub relations_dropped: usize,
    /// Relations repeating an edge already in the fragment
    pub relations_duplicate: usize,
    pub malformed_entries: usize,
}

impl FragmentStats {
    fn accumulate(&mut self, other: &FragmentStats) {
        self.entities_added += other.entities_added;
        self.entities_skipped += other.entities_skipped;
        self.contains_edges += other.contains_edges;
        self.relations_added += other.relations_added;
        self.relations_dropped += other.relations_dropped;
        self.relations_duplicate += other.relations_duplicate;
        self.malformed_entries += other.malformed_entries;
    }
}

/// The fragment built from one document
#[derive(Debug, Clone)]
pub struct FragmentOutcome {
    pub fragment: KnowledgeGraph,
    pub document_node_id: String,
    pub stats: FragmentStats,
}

/// A document that could not be ingested
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub document_id: String,
    pub title: String,
    /// Error code of the failure
    pub code: String,
    pub reason: String,
}

/// Summary of one ingestion batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub skipped: Vec<SkippedDocument>,
    /// Size of the accumulated batch graph
    pub node_count: usize,
    pub edge_count: usize,
    pub totals: FragmentStats,
}

impl BatchReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn total_documents(&self) -> usize {
        self.processed + self.skipped.len()
    }
}

/// Converts extraction results into graph fragments
#[derive(Debug, Clone)]
pub struct GraphIngestionPipeline {
    min_entity_chars: usize,
}

impl Default for GraphIngestionPipeline {
    fn default() -> Self {
        Self {
            min_entity_chars: DEFAULT_MIN_ENTITY_CHARS,
        }
    }
}

impl GraphIngestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_entity_chars(mut self, min_entity_chars: usize) -> Self {
        self.min_entity_chars = min_entity_chars.max(1);
        self
    }

    /// Build the fragment for one document
    ///
    /// Fails only when the title is empty after normalization; bad entities
    /// and relations are skipped and counted.
    pub fn build_fragment(
        &self,
        document: &SourceDocument,
        extraction: &RawExtraction,
    ) -> Result<FragmentOutcome> {
        let title = Node::normalize_label(&document.title);
        if title.is_empty() {
            return Err(Error::InvalidInput(format!(
                "document '{}' has an empty title",
                document.document_id
            )));
        }

        let mut fragment = KnowledgeGraph::new();
        let mut stats = FragmentStats {
            malformed_entries: extraction.malformed,
            ..FragmentStats::default()
        };

        let doc_id = document_node_id(&title);
        fragment.add_node(
            Node::new(&doc_id, &title, NodeType::Policy)
                .with_attribute("document_id", document.document_id.clone()),
        );

        // mention text -> node id, for relation resolution within this document.
        // Seeded with the title: an entity naming the document itself is the
        // document node, not a new entity.
        let mut local: HashMap<String, String> = HashMap::new();
        local.insert(title.clone(), doc_id.clone());

        for entity in &extraction.entities {
            let text = entity.text.trim();
            if text.chars().count() < self.min_entity_chars || local.contains_key(text) {
                debug!(document_id = %document.document_id, entity = %text, "Skipping short or repeated mention");
                stats.entities_skipped += 1;
                continue;
            }

            let id = entity_node_id(&title, text);
            let mut node = Node::new(&id, text, NodeType::parse(&entity.entity_type))
                .with_attribute("source_document", document.document_id.clone());
            if !entity.description.is_empty() {
                node = node.with_attribute("description", entity.description.clone());
            }
            fragment.add_node(node);
            local.insert(text.to_string(), id.clone());
            stats.entities_added += 1;

            let contains = Edge::new(&doc_id, &id, RelationType::Contains)
                .with_attribute("color", relation_color(&RelationType::Contains));
            if fragment.add_edge(contains) {
                stats.contains_edges += 1;
            }
        }

        for relation in &extraction.relations {
            let source = local.get(relation.source.trim());
            let target = local.get(relation.target.trim());
            let (Some(source), Some(target)) = (source, target) else {
                warn!(
                    document_id = %document.document_id,
                    source = %relation.source,
                    target = %relation.target,
                    "Dropping relation with unresolved endpoint"
                );
                stats.relations_dropped += 1;
                continue;
            };
            if source == target {
                debug!(document_id = %document.document_id, node = %source, "Dropping self relation");
                stats.relations_dropped += 1;
                continue;
            }

            let relation_type = RelationType::parse(&relation.relation);
            let color = relation_color(&relation_type);
            let edge = Edge::new(source, target, relation_type)
                .with_label(relation.relation.trim())
                .with_attribute("color", color);
            if fragment.add_edge(edge) {
                stats.relations_added += 1;
            } else {
                stats.relations_duplicate += 1;
            }
        }

        debug!(
            document_id = %document.document_id,
            nodes = fragment.node_count(),
            edges = fragment.edge_count(),
            "Built document fragment"
        );

        Ok(FragmentOutcome {
            fragment,
            document_node_id: doc_id,
            stats,
        })
    }

    /// Extract and ingest documents one at a time
    ///
    /// A document whose extraction or fragment construction fails is skipped
    /// and recorded in the report; the rest of the batch continues. Only a
    /// persistence error from the extractor aborts the batch.
    pub async fn ingest_batch(
        &self,
        documents: &[SourceDocument],
        extractor: &dyn DocumentExtractor,
    ) -> Result<(KnowledgeGraph, BatchReport)> {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%batch_id, documents = documents.len(), "Starting ingestion batch");

        let mut graph = KnowledgeGraph::new();
        let mut processed = 0;
        let mut skipped = Vec::new();
        let mut totals = FragmentStats::default();

        for document in documents {
            let outcome = match extractor.extract(document).await {
                Ok(value) => self.build_fragment(document, &RawExtraction::from_value(&value)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(outcome) => {
                    totals.accumulate(&outcome.stats);
                    graph.absorb(outcome.fragment);
                    processed += 1;
                }
                Err(e) if e.is_persistence() => return Err(e),
                Err(e) => {
                    warn!(
                        %batch_id,
                        document_id = %document.document_id,
                        error = %e,
                        "Skipping document"
                    );
                    skipped.push(SkippedDocument {
                        document_id: document.document_id.clone(),
                        title: document.title.clone(),
                        code: e.code().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = BatchReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            processed,
            skipped,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            totals,
        };
        info!(
            %batch_id,
            processed = report.processed,
            skipped = report.skipped_count(),
            nodes = report.node_count,
            edges = report.edge_count,
            relations_dropped = report.totals.relations_dropped,
            "Ingestion batch finished"
        );
        Ok((graph, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingestion::StaticExtractor;
    use serde_json::json;

    fn extraction(value: serde_json::Value) -> RawExtraction {
        RawExtraction::from_value(&value)
    }

    fn sample() -> RawExtraction {
        extraction(json!({
            "entities": [
                {"text": "专项债", "type": "concept"},
                {"text": "财政部", "type": "authority"}
            ],
            "relations": [{"source": "财政部", "target": "专项债", "type": "发布"}]
        }))
    }

    #[test]
    fn test_single_document_fragment() {
        let pipeline = GraphIngestionPipeline::new();
        let document = SourceDocument::new("42", "文件甲", "");
        let outcome = pipeline.build_fragment(&document, &sample()).unwrap();

        let graph = &outcome.fragment;
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);

        let doc = graph.get_node(&outcome.document_node_id).unwrap();
        assert_eq!(doc.node_type, NodeType::Policy);
        assert_eq!(doc.document_reference().as_deref(), Some("42"));

        let contains = graph
            .edges()
            .iter()
            .filter(|e| e.relation_type == RelationType::Contains)
            .count();
        assert_eq!(contains, 2);

        let issued = graph
            .edges()
            .iter()
            .find(|e| e.relation_type == RelationType::IssuedBy)
            .unwrap();
        assert_eq!(issued.label, "发布");
        assert_eq!(issued.source_id, entity_node_id("文件甲", "财政部"));
        assert_eq!(outcome.stats.relations_added, 1);
    }

    #[test]
    fn test_ids_are_deterministic_and_title_normalized() {
        let pipeline = GraphIngestionPipeline::new();
        let a = pipeline
            .build_fragment(&SourceDocument::new("1", "文件甲.pdf", ""), &sample())
            .unwrap();
        let b = pipeline
            .build_fragment(&SourceDocument::new("2", " 文件甲 ", ""), &sample())
            .unwrap();
        assert_eq!(a.document_node_id, b.document_node_id);
        assert_eq!(a.document_node_id, document_node_id("文件甲"));
        assert!(a.document_node_id.starts_with("doc_"));
        assert_eq!(a.document_node_id.len(), 4 + ID_HASH_LEN);
    }

    #[test]
    fn test_unresolvable_relation_is_dropped() {
        let pipeline = GraphIngestionPipeline::new();
        let raw = extraction(json!({
            "entities": [{"text": "专项债", "type": "concept"}],
            "relations": [
                {"source": "国务院", "target": "专项债", "type": "发布"},
                {"source": "文件甲", "target": "专项债", "type": "引用"}
            ]
        }));
        let outcome = pipeline
            .build_fragment(&SourceDocument::new("1", "文件甲", ""), &raw)
            .unwrap();

        assert_eq!(outcome.stats.relations_dropped, 1);
        assert_eq!(outcome.stats.relations_added, 1);
        assert_eq!(outcome.fragment.node_count(), 2);
        // contains + references from the document node
        assert_eq!(outcome.fragment.edge_count(), 2);
    }

    #[test]
    fn test_short_and_repeated_mentions_skipped() {
        let pipeline = GraphIngestionPipeline::new();
        let raw = extraction(json!({
            "entities": [
                {"text": "省", "type": "region"},
                {"text": "专项债"},
                {"text": " 专项债 "},
                {"text": "文件甲"}
            ],
            "relations": [{"source": "专项债", "target": "专项债", "type": "相关"}]
        }));
        let outcome = pipeline
            .build_fragment(&SourceDocument::new("1", "文件甲", ""), &raw)
            .unwrap();

        assert_eq!(outcome.stats.entities_added, 1);
        assert_eq!(outcome.stats.entities_skipped, 3);
        assert_eq!(outcome.stats.relations_dropped, 1);
        assert_eq!(outcome.fragment.node_count(), 2);
        let titled: Vec<&str> = outcome
            .fragment
            .nodes()
            .iter()
            .filter(|n| n.label == "文件甲")
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(titled, vec![outcome.document_node_id.as_str()]);
    }

    #[test]
    fn test_duplicate_relation_counted() {
        let pipeline = GraphIngestionPipeline::new();
        let raw = extraction(json!({
            "entities": [{"text": "专项债"}, {"text": "财政部"}],
            "relations": [
                {"source": "财政部", "target": "专项债", "type": "发布"},
                {"source": "财政部", "target": "专项债", "type": "印发"}
            ]
        }));
        let outcome = pipeline
            .build_fragment(&SourceDocument::new("1", "文件甲", ""), &raw)
            .unwrap();
        assert_eq!(outcome.stats.relations_added, 1);
        assert_eq!(outcome.stats.relations_duplicate, 1);
    }

    #[test]
    fn test_empty_title_rejected() {
        let pipeline = GraphIngestionPipeline::new();
        let err = pipeline
            .build_fragment(&SourceDocument::new("1", " .pdf ", ""), &sample())
            .unwrap_err();
        assert_eq!(err.code(), "E800");
    }

    #[tokio::test]
    async fn test_batch_skips_failed_documents() {
        let extractor = StaticExtractor::new()
            .with_result("a", json!({"entities": [{"text": "专项债"}]}))
            .with_result("c", json!({"entities": [{"text": "专项债"}, {"text": "交通运输部"}]}));
        let documents = vec![
            SourceDocument::new("a", "文件甲", ""),
            SourceDocument::new("b", "文件乙", ""),
            SourceDocument::new("c", "文件丙", ""),
        ];

        let (graph, report) = GraphIngestionPipeline::new()
            .ingest_batch(&documents, &extractor)
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skipped[0].document_id, "b");
        assert_eq!(report.skipped[0].code, "E201");
        assert_eq!(report.total_documents(), 3);

        // "专项债" stays one node per document until deduplication
        assert_eq!(graph.node_count(), 5);
        assert_eq!(report.node_count, 5);
        assert_eq!(report.totals.contains_edges, 3);
    }
}
