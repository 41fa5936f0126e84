//! Graph-grounded retrieval
//!
//! Resolves the entities a query mentions onto graph nodes, expands them into
//! a budgeted subgraph and reports the documents and relations it contains.

mod cache;
mod mentions;
mod resolver;
mod retriever;
mod subgraph;

pub use cache::GraphCache;
pub use mentions::{
    DEFAULT_MAX_MENTIONS, LlmMentionExtractor, MentionExtractor, fallback_mentions,
    split_mention_list,
};
pub use resolver::{
    ADMIN_PREFIXES, EntityMatch, EntityResolver, LARGE_GRAPH_NODES, MatchTier, Resolution,
};
pub use retriever::{DEFAULT_MAX_RELATIONS, HybridRetriever, RelationTriple, RetrievalContext};
pub use subgraph::{DEFAULT_NODE_BUDGET, SubgraphBuilder};
