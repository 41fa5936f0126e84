//! Domain layer
//!
//! - `knowledge`: graph model, snapshot format, store trait and the service
//!   that wires ingestion, persistence and retrieval together
//! - `ingestion`: turns per-document extraction results into graph fragments
//! - `retrieval`: graph-grounded retrieval for a natural-language query

pub mod ingestion;
pub mod knowledge;
pub mod retrieval;
