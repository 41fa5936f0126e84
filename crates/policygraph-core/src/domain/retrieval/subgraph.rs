//! Budgeted one-hop subgraph expansion

use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::debug;

use crate::domain::knowledge::KnowledgeGraph;

/// Default total node budget for a retrieval subgraph
pub const DEFAULT_NODE_BUDGET: usize = 30;

/// Expands seed nodes by one hop under a node budget
///
/// Seeds are always kept, even when they alone exceed the budget. Neighbors
/// fill the remaining slots by full-graph degree, highest first, with node id
/// ascending as the tie-break.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubgraphBuilder;

impl SubgraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Ids of the nodes to keep: seeds first, then ranked neighbors
    pub fn select_nodes(&self, graph: &KnowledgeGraph, seeds: &[String], budget: usize) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for seed in seeds {
            if graph.contains_node(seed) && seen.insert(seed.as_str()) {
                selected.push(seed.clone());
            }
        }

        let mut neighbors: Vec<(usize, &str)> = Vec::new();
        for seed in &selected {
            for neighbor in graph.get_neighbors(seed) {
                if seen.insert(neighbor.id.as_str()) {
                    neighbors.push((graph.degree(&neighbor.id), neighbor.id.as_str()));
                }
            }
        }
        neighbors.sort_by_key(|&(degree, id)| (Reverse(degree), id));

        let room = budget.saturating_sub(selected.len());
        if neighbors.len() > room {
            debug!(
                seeds = selected.len(),
                neighbors = neighbors.len(),
                kept = room,
                "Truncating neighbors to node budget"
            );
        }

        selected.extend(
            neighbors
                .into_iter()
                .take(room)
                .map(|(_, id)| id.to_string()),
        );
        selected
    }

    /// Induced subgraph over the selected nodes
    pub fn build(&self, graph: &KnowledgeGraph, seeds: &[String], budget: usize) -> KnowledgeGraph {
        graph.induced_subgraph(self.select_nodes(graph, seeds, budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Edge, Node, NodeType, RelationType};

    /// `hub` has five neighbors; `n1` and `n2` also link to `far`
    fn star() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for id in ["hub", "n1", "n2", "n3", "n4", "n5", "far"] {
            graph.add_node(Node::new(id, id, NodeType::Concept));
        }
        for id in ["n1", "n2", "n3", "n4", "n5"] {
            graph.add_edge(Edge::new("hub", id, RelationType::RelatesTo));
        }
        graph.add_edge(Edge::new("n2", "far", RelationType::RelatesTo));
        graph.add_edge(Edge::new("n1", "far", RelationType::RelatesTo));
        graph
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_under_budget_keeps_all_neighbors() {
        let selected = SubgraphBuilder::new().select_nodes(&star(), &ids(&["hub"]), 30);
        assert_eq!(selected.len(), 6);
        assert_eq!(selected[0], "hub");
        assert!(!selected.contains(&"far".to_string()));
    }

    #[test]
    fn test_truncation_ranks_by_degree_then_id() {
        let selected = SubgraphBuilder::new().select_nodes(&star(), &ids(&["hub"]), 4);
        assert_eq!(selected, ids(&["hub", "n1", "n2", "n3"]));
    }

    #[test]
    fn test_seeds_kept_beyond_budget() {
        let graph = star();
        let builder = SubgraphBuilder::new();
        let selected = builder.select_nodes(&graph, &ids(&["n3", "n4", "n5"]), 2);
        assert_eq!(selected, ids(&["n3", "n4", "n5"]));

        let subgraph = builder.build(&graph, &ids(&["hub"]), 0);
        assert_eq!(subgraph.node_count(), 1);
    }

    #[test]
    fn test_budget_never_exceeded_when_seeds_fit() {
        let graph = star();
        let builder = SubgraphBuilder::new();
        for budget in 1..8 {
            let subgraph = builder.build(&graph, &ids(&["hub", "far"]), budget);
            assert!(subgraph.node_count() <= budget.max(2));
            assert!(subgraph.contains_node("hub"));
            assert!(subgraph.contains_node("far"));
        }
    }

    #[test]
    fn test_unknown_and_duplicate_seeds_ignored() {
        let selected = SubgraphBuilder::new().select_nodes(&star(), &ids(&["ghost", "n3", "n3"]), 5);
        assert_eq!(selected, ids(&["n3", "hub"]));
    }

    #[test]
    fn test_build_keeps_induced_edges() {
        let subgraph = SubgraphBuilder::new().build(&star(), &ids(&["far"]), 10);
        assert_eq!(subgraph.node_count(), 3);
        assert_eq!(subgraph.edge_count(), 2);
    }
}
