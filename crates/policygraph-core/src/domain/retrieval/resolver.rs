//! Mention-to-node resolution
//!
//! Matching is tiered per `(mention, node)` pair: exact label, then labels with
//! administrative prefixes stripped, then substring containment either way.
//! All comparisons are case-insensitive.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::knowledge::KnowledgeGraph;

/// Administrative prefixes removed before the second matching tier
pub const ADMIN_PREFIXES: &[&str] = &["中华人民共和国", "中共中央", "国务院", "全国", "中国", "国家"];

/// Graph size above which a linear scan per query is logged as a warning
pub const LARGE_GRAPH_NODES: usize = 10_000;

/// How a mention matched a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    PrefixStripped,
    Substring,
}

/// A single mention/node match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityMatch {
    pub mention: String,
    pub node_id: String,
    pub label: String,
    pub tier: MatchTier,
}

/// Resolved node ids (first-seen order, no duplicates) and every match found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub node_ids: Vec<String>,
    pub matches: Vec<EntityMatch>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

/// Maps free-text mentions onto graph nodes
#[derive(Debug, Clone)]
pub struct EntityResolver {
    prefixes: Vec<String>,
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self {
            prefixes: ADMIN_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the prefix list used by the prefix-stripped tier
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        self
    }

    /// Remove leading administrative prefixes, repeatedly
    pub fn strip_prefixes<'a>(&self, text: &'a str) -> &'a str {
        let mut current = text.trim();
        while let Some(rest) = self
            .prefixes
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix.as_str()))
        {
            current = rest.trim_start();
        }
        current
    }

    /// First tier at which `mention` matches `label`, if any
    pub fn match_tier(&self, mention: &str, label: &str) -> Option<MatchTier> {
        let mention = mention.trim().to_lowercase();
        let label = label.trim().to_lowercase();
        if mention.is_empty() || label.is_empty() {
            return None;
        }

        if mention == label {
            return Some(MatchTier::Exact);
        }

        let stripped_mention = self.strip_prefixes(&mention);
        let stripped_label = self.strip_prefixes(&label);
        if !stripped_mention.is_empty() && stripped_mention == stripped_label {
            return Some(MatchTier::PrefixStripped);
        }

        if label.contains(&mention) || mention.contains(&label) {
            return Some(MatchTier::Substring);
        }
        None
    }

    /// Resolve every mention against every node of the graph
    pub fn resolve(&self, graph: &KnowledgeGraph, mentions: &[String]) -> Resolution {
        if graph.node_count() > LARGE_GRAPH_NODES {
            warn!(
                nodes = graph.node_count(),
                mentions = mentions.len(),
                "Resolving against a large graph with a linear scan"
            );
        }

        let mut resolution = Resolution::default();
        let mut seen = HashSet::new();

        for mention in mentions {
            for node in graph.nodes() {
                let Some(tier) = self.match_tier(mention, &node.label) else {
                    continue;
                };
                if seen.insert(node.id.clone()) {
                    resolution.node_ids.push(node.id.clone());
                }
                resolution.matches.push(EntityMatch {
                    mention: mention.clone(),
                    node_id: node.id.clone(),
                    label: node.label.clone(),
                    tier,
                });
            }
        }

        debug!(
            mentions = mentions.len(),
            matched = resolution.node_ids.len(),
            "Resolved mentions"
        );
        resolution
    }
}
