//! In-memory policy knowledge graph
//!
//! Nodes keep insertion order; edges are unique per
//! `(source_id, target_id, relation_type)` and every traversal treats them as
//! undirected through a derived adjacency index. Lookups on absent ids return
//! empty results rather than errors.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::edge::{Edge, RelationType};
use super::node::Node;
use super::snapshot::GraphSnapshot;

/// Typed, undirected-for-traversal knowledge graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphSnapshot", from = "GraphSnapshot")]
pub struct KnowledgeGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_keys: HashSet<(String, String, RelationType)>,
    adjacency: HashMap<String, BTreeSet<String>>,
}

/// Structural statistics of a graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// `2E / (N(N-1))`, 0 for graphs with fewer than two nodes
    pub density: f64,
    pub connected_components: usize,
    /// Longest shortest path; only defined for connected graphs with N > 1
    pub diameter: Option<usize>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns false (and changes nothing) if the id is present
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.adjacency.entry(node.id.clone()).or_default();
        self.nodes.push(node);
        true
    }

    /// Add an edge; returns false if an endpoint is missing or the
    /// `(source, target, relation_type)` triple already exists
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.index.contains_key(&edge.source_id) || !self.index.contains_key(&edge.target_id)
        {
            return false;
        }
        if !self.edge_keys.insert(edge.key()) {
            return false;
        }
        self.link(&edge.source_id, &edge.target_id);
        self.edges.push(edge);
        true
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct adjacent nodes
    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map_or(0, BTreeSet::len)
    }

    /// Adjacent nodes ordered by id; empty if the id is absent
    pub fn get_neighbors(&self, id: &str) -> Vec<&Node> {
        self.adjacency
            .get(id)
            .map(|ids| ids.iter().filter_map(|n| self.get_node(n)).collect())
            .unwrap_or_default()
    }

    /// Nodes related to `id` by an edge in either direction, with the relation
    ///
    /// Self-loops are skipped, matching `get_neighbors`.
    pub fn get_related(
        &self,
        id: &str,
        relation_type: Option<&RelationType>,
    ) -> Vec<(&Node, &RelationType)> {
        self.edges
            .iter()
            .filter(|edge| relation_type.is_none_or(|wanted| &edge.relation_type == wanted))
            .filter_map(|edge| {
                let other = edge.other_end(id).filter(|other| *other != id)?;
                self.get_node(other).map(|node| (node, &edge.relation_type))
            })
            .collect()
    }

    /// Unweighted shortest path (BFS); `None` if either end is absent or
    /// the two are disconnected
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if !self.contains_node(from) || !self.contains_node(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut queue: VecDeque<&str> = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbor_ids(current) {
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, current);
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut step = to;
                    while let Some(&parent) = parents.get(step) {
                        path.push(parent.to_string());
                        step = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// All nodes reachable from `id` (including itself); empty if absent
    pub fn connected_component(&self, id: &str) -> Vec<&Node> {
        if !self.contains_node(id) {
            return Vec::new();
        }
        let reached = self.distances_from(id, None);
        self.nodes
            .iter()
            .filter(|node| reached.contains_key(node.id.as_str()))
            .collect()
    }

    /// Induced subgraph of all nodes within `radius` hops of `id`
    pub fn ego_graph(&self, id: &str, radius: usize) -> KnowledgeGraph {
        if !self.contains_node(id) {
            return KnowledgeGraph::new();
        }
        let reached = self.distances_from(id, Some(radius));
        self.induced_subgraph(reached.keys())
    }

    /// Subgraph over exactly the given ids (unknown ids are ignored) and
    /// every edge with both endpoints inside; original node order is kept
    pub fn induced_subgraph<I, S>(&self, ids: I) -> KnowledgeGraph
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: HashSet<String> = ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();

        let mut subgraph = KnowledgeGraph::new();
        for node in self.nodes.iter().filter(|n| wanted.contains(&n.id)) {
            subgraph.add_node(node.clone());
        }
        for edge in &self.edges {
            if wanted.contains(&edge.source_id) && wanted.contains(&edge.target_id) {
                subgraph.add_edge(edge.clone());
            }
        }
        subgraph
    }

    /// Node/edge counts, density, component count and diameter
    pub fn stats(&self) -> GraphStats {
        let n = self.node_count();
        let e = self.edge_count();
        let density = if n > 1 {
            (2.0 * e as f64) / (n as f64 * (n as f64 - 1.0))
        } else {
            0.0
        };

        let components = self.component_count();
        let diameter = if n > 1 && components == 1 {
            self.nodes
                .iter()
                .filter_map(|node| self.distances_from(&node.id, None).into_values().max())
                .max()
        } else {
            None
        };

        GraphStats {
            node_count: n,
            edge_count: e,
            density,
            connected_components: components,
            diameter,
        }
    }

    /// Remove a node and every incident edge
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let position = self.index.remove(id)?;
        let node = self.nodes.remove(position);
        for (i, later) in self.nodes.iter().enumerate().skip(position) {
            self.index.insert(later.id.clone(), i);
        }

        self.edges.retain(|edge| !edge.touches(id));
        self.edge_keys.retain(|(source, target, _)| source != id && target != id);

        if let Some(neighbors) = self.adjacency.remove(id) {
            for neighbor in neighbors {
                if let Some(set) = self.adjacency.get_mut(&neighbor) {
                    set.remove(id);
                }
            }
        }
        Some(node)
    }

    /// Union another graph into this one with add-semantics: existing nodes
    /// and edge triples are kept, new ones appended
    ///
    /// Returns the number of nodes and edges actually added.
    pub fn absorb(&mut self, other: KnowledgeGraph) -> (usize, usize) {
        let nodes_added = other
            .nodes
            .into_iter()
            .filter(|node| self.add_node(node.clone()))
            .count();
        let edges_added = other
            .edges
            .into_iter()
            .filter(|edge| self.add_edge(edge.clone()))
            .count();
        (nodes_added, edges_added)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn link(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    fn neighbor_ids<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// BFS hop distances from `start`, optionally bounded
    fn distances_from<'a>(&'a self, start: &'a str, limit: Option<usize>) -> HashMap<&'a str, usize> {
        let mut distances = HashMap::from([(start, 0usize)]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let depth = distances[current];
            if limit.is_some_and(|max| depth >= max) {
                continue;
            }
            for next in self.neighbor_ids(current) {
                if !distances.contains_key(next) {
                    distances.insert(next, depth + 1);
                    queue.push_back(next);
                }
            }
        }
        distances
    }

    fn component_count(&self) -> usize {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut count = 0;
        for node in &self.nodes {
            if seen.contains(node.id.as_str()) {
                continue;
            }
            count += 1;
            seen.extend(self.distances_from(&node.id, None).into_keys());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::NodeType;

    fn node(id: &str) -> Node {
        Node::new(id, id.to_uppercase(), NodeType::Concept)
    }

    /// a - b - c    d
    fn chain() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.add_node(node(id));
        }
        graph.add_edge(Edge::new("a", "b", RelationType::RelatesTo));
        graph.add_edge(Edge::new("c", "b", RelationType::Affects));
        graph
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = KnowledgeGraph::new();
        assert!(graph.add_node(node("a")));
        assert!(!graph.add_node(Node::new("a", "other label", NodeType::Policy)));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.get_node("a").unwrap().label, "A");
    }

    #[test]
    fn test_add_edge_requires_endpoints() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(node("a"));
        assert!(!graph.add_edge(Edge::new("a", "missing", RelationType::RelatesTo)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_duplicate_edge_triple_rejected() {
        let mut graph = chain();
        assert!(!graph.add_edge(Edge::new("a", "b", RelationType::RelatesTo)));
        assert!(graph.add_edge(Edge::new("a", "b", RelationType::References)));
        assert_eq!(graph.edge_count(), 3);
        // parallel edges do not inflate the degree
        assert_eq!(graph.degree("a"), 1);
    }

    #[test]
    fn test_neighbors_are_undirected() {
        let graph = chain();
        let ids: Vec<&str> = graph.get_neighbors("b").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(graph.get_neighbors("d").is_empty());
        assert!(graph.get_neighbors("missing").is_empty());
    }

    #[test]
    fn test_get_related_filters_by_type() {
        let graph = chain();
        let related = graph.get_related("b", None);
        assert_eq!(related.len(), 2);

        let affects = graph.get_related("b", Some(&RelationType::Affects));
        assert_eq!(affects.len(), 1);
        assert_eq!(affects[0].0.id, "c");
        assert_eq!(affects[0].1, &RelationType::Affects);
    }

    #[test]
    fn test_shortest_path() {
        let graph = chain();
        assert_eq!(
            graph.shortest_path("a", "c"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(graph.shortest_path("a", "a"), Some(vec!["a".to_string()]));
        assert_eq!(graph.shortest_path("a", "d"), None);
        assert_eq!(graph.shortest_path("a", "missing"), None);
    }

    #[test]
    fn test_connected_component() {
        let graph = chain();
        let ids: Vec<&str> = graph
            .connected_component("c")
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(graph.connected_component("d").len(), 1);
        assert!(graph.connected_component("missing").is_empty());
    }

    #[test]
    fn test_ego_graph_radius() {
        let graph = chain();
        let ego = graph.ego_graph("a", 1);
        assert_eq!(ego.node_count(), 2);
        assert_eq!(ego.edge_count(), 1);

        let ego = graph.ego_graph("a", 2);
        assert_eq!(ego.node_count(), 3);

        let ego = graph.ego_graph("a", 0);
        assert_eq!(ego.node_count(), 1);
        assert!(graph.ego_graph("missing", 3).is_empty());
    }

    #[test]
    fn test_induced_subgraph_keeps_only_inner_edges() {
        let graph = chain();
        let sub = graph.induced_subgraph(["c", "b", "missing"]);
        let ids: Vec<&str> = sub.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(sub.edge_count(), 1);
        assert_eq!(sub.edges()[0].relation_type, RelationType::Affects);
    }

    #[test]
    fn test_stats_disconnected() {
        let stats = chain().stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 2);
        assert!((stats.density - 4.0 / 12.0).abs() < f64::EPSILON);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.diameter, None);
    }

    #[test]
    fn test_stats_connected() {
        let mut graph = chain();
        graph.remove_node("d");
        let stats = graph.stats();
        assert_eq!(stats.connected_components, 1);
        assert_eq!(stats.diameter, Some(2));
    }

    #[test]
    fn test_stats_empty_and_single() {
        let stats = KnowledgeGraph::new().stats();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.density, 0.0);
        assert_eq!(stats.connected_components, 0);
        assert_eq!(stats.diameter, None);

        let mut single = KnowledgeGraph::new();
        single.add_node(node("a"));
        let stats = single.stats();
        assert_eq!(stats.connected_components, 1);
        assert_eq!(stats.diameter, None);
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut graph = chain();
        let removed = graph.remove_node("b").unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.degree("a"), 0);
        assert!(graph.get_node("b").is_none());
        // later nodes are still addressable after the index shift
        assert_eq!(graph.get_node("d").unwrap().id, "d");
        // the triple can be re-added once the endpoint exists again
        graph.add_node(node("b"));
        assert!(graph.add_edge(Edge::new("a", "b", RelationType::RelatesTo)));
        assert!(graph.remove_node("missing").is_none());
    }

    #[test]
    fn test_absorb_uses_add_semantics() {
        let mut graph = chain();
        let mut fragment = KnowledgeGraph::new();
        fragment.add_node(Node::new("a", "changed", NodeType::Policy));
        fragment.add_node(node("e"));
        fragment.add_edge(Edge::new("a", "e", RelationType::Contains));

        let (nodes_added, edges_added) = graph.absorb(fragment);
        assert_eq!((nodes_added, edges_added), (1, 1));
        assert_eq!(graph.get_node("a").unwrap().label, "A");
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn test_self_loop_does_not_count_as_neighbor() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(node("a"));
        assert!(graph.add_edge(Edge::new("a", "a", RelationType::RelatesTo)));
        assert_eq!(graph.degree("a"), 0);
        assert!(graph.get_neighbors("a").is_empty());
        assert!(graph.get_related("a", None).is_empty());

        graph.add_node(node("b"));
        graph.add_edge(Edge::new("a", "b", RelationType::Contains));
        let related: Vec<&str> = graph
            .get_related("a", None)
            .into_iter()
            .map(|(n, _)| n.id.as_str())
            .collect();
        assert_eq!(related, vec!["b"]);
    }

    #[test]
    fn test_clear() {
        let mut graph = chain();
        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }
}
