//! Ingestion of policy documents into the knowledge graph
//!
//! Extraction collaborators turn a document into raw entities and relations;
//! the pipeline converts those into per-document graph fragments.

mod extraction;
mod llm_extractor;
mod pipeline;

pub use extraction::{
    DocumentExtractor, ExtractionRecord, RawEntity, RawExtraction, RawRelation, SourceDocument,
    StaticExtractor, extract_json_from_response,
};
pub use llm_extractor::{DEFAULT_MAX_TEXT_CHARS, LlmDocumentExtractor, truncate_for_prompt};
pub use pipeline::{
    BatchReport, DEFAULT_MIN_ENTITY_CHARS, FragmentOutcome, FragmentStats, GraphIngestionPipeline,
    SkippedDocument, document_node_id, entity_node_id,
};
