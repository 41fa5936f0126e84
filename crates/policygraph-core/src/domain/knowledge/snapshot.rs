//! Persisted snapshot format
//!
//! The stored and exported graph is a flat `{nodes, edges}` document in the
//! shape visualization front-ends expect: edges use `from`/`to` and node
//! styles are flattened next to the attributes. This module is the only
//! place that converts between that shape and [`KnowledgeGraph`]; it also
//! owns the snapshot-level maintenance operations (merge and label
//! deduplication) the store runs without materializing a graph.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::edge::{Edge, RelationType};
use super::graph::KnowledgeGraph;
use super::node::{Attributes, Node, NodeType};
use super::style::NodeStyle;

/// Serialized graph body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
    #[serde(default)]
    pub edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_type")]
    pub node_type: NodeType,
    /// Hover text
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub color: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_type")]
    pub relation_type: RelationType,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// Outcome of a label deduplication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub removed_nodes: usize,
    pub removed_edges: usize,
    pub node_count: usize,
    pub edge_count: usize,
}

impl DedupReport {
    pub fn changed(&self) -> bool {
        self.removed_nodes > 0 || self.removed_edges > 0
    }
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Merge `incoming` over `self` with last-write-wins semantics
    ///
    /// Nodes are keyed by id and edges by `(from, to)`. A key present in both
    /// takes the incoming entry at the position of its first occurrence; new
    /// keys are appended in incoming order.
    pub fn merge(self, incoming: GraphSnapshot) -> GraphSnapshot {
        let nodes = merge_keyed(self.nodes, incoming.nodes, |n| n.id.clone());
        let edges = merge_keyed(self.edges, incoming.edges, |e| {
            (e.from.clone(), e.to.clone())
        });
        GraphSnapshot { nodes, edges }
    }

    /// Collapse nodes whose normalized labels collide
    ///
    /// The first node seen for each normalized label survives and takes the
    /// normalized label; edges are rewired onto survivors, edges with an
    /// endpoint that no longer exists are dropped, and edges that became
    /// identical `(from, to, type)` after rewiring are collapsed. Running it
    /// twice changes nothing the second time.
    pub fn deduplicate(&mut self) -> DedupReport {
        let before_nodes = self.nodes.len();
        let before_edges = self.edges.len();

        let mut survivor_by_label: HashMap<String, String> = HashMap::new();
        let mut remap: HashMap<String, String> = HashMap::new();
        let mut survivors: Vec<SnapshotNode> = Vec::with_capacity(self.nodes.len());

        for mut node in self.nodes.drain(..) {
            let normalized = Node::normalize_label(&node.label);
            match survivor_by_label.get(&normalized) {
                Some(survivor) => {
                    debug!(duplicate = %node.id, survivor = %survivor, label = %normalized, "Merging duplicate node");
                    remap.insert(node.id, survivor.clone());
                }
                None => {
                    survivor_by_label.insert(normalized.clone(), node.id.clone());
                    remap.insert(node.id.clone(), node.id.clone());
                    if node.label != normalized {
                        if node.title == node.label {
                            node.title = normalized.clone();
                        }
                        node.label = normalized;
                    }
                    survivors.push(node);
                }
            }
        }
        self.nodes = survivors;

        let mut seen: HashSet<(String, String, RelationType)> = HashSet::new();
        let mut edges = Vec::with_capacity(self.edges.len());
        for mut edge in self.edges.drain(..) {
            // remap only knows ids of nodes that existed, and maps them onto survivors
            let (Some(from), Some(to)) = (remap.get(&edge.from), remap.get(&edge.to)) else {
                continue;
            };
            edge.from = from.clone();
            edge.to = to.clone();
            if seen.insert((edge.from.clone(), edge.to.clone(), edge.relation_type.clone())) {
                edges.push(edge);
            }
        }
        self.edges = edges;

        DedupReport {
            removed_nodes: before_nodes - self.nodes.len(),
            removed_edges: before_edges - self.edges.len(),
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
        }
    }
}

fn merge_keyed<T, K, F>(existing: Vec<T>, incoming: Vec<T>, key: F) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut merged: Vec<T> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<K, usize> = HashMap::new();

    for item in existing.into_iter().chain(incoming) {
        let k = key(&item);
        match positions.get(&k) {
            Some(&pos) => merged[pos] = item,
            None => {
                positions.insert(k, merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

impl From<&Node> for SnapshotNode {
    fn from(node: &Node) -> Self {
        let title = node
            .attribute_str("description")
            .unwrap_or_else(|| node.label.clone());
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            node_type: node.node_type.clone(),
            title,
            size: node.style.size,
            color: node.style.color.clone(),
            icon: node.style.icon.clone(),
            attributes: node.attributes.clone(),
        }
    }
}

impl From<SnapshotNode> for Node {
    fn from(snapshot: SnapshotNode) -> Self {
        let defaults = NodeStyle::for_type(&snapshot.node_type);
        let style = NodeStyle {
            icon: non_empty_or(snapshot.icon, defaults.icon),
            size: if snapshot.size == 0 {
                defaults.size
            } else {
                snapshot.size
            },
            color: non_empty_or(snapshot.color, defaults.color),
        };
        let label = if snapshot.label.is_empty() {
            snapshot.id.clone()
        } else {
            snapshot.label
        };
        Node {
            id: snapshot.id,
            label,
            node_type: snapshot.node_type,
            attributes: snapshot.attributes,
            style,
        }
    }
}

impl From<&Edge> for SnapshotEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            from: edge.source_id.clone(),
            to: edge.target_id.clone(),
            relation_type: edge.relation_type.clone(),
            label: edge.label.clone(),
            attributes: edge.attributes.clone(),
        }
    }
}

impl From<SnapshotEdge> for Edge {
    fn from(snapshot: SnapshotEdge) -> Self {
        let mut edge = Edge::new(snapshot.from, snapshot.to, snapshot.relation_type)
            .with_label(snapshot.label);
        edge.attributes = snapshot.attributes;
        edge
    }
}

impl From<&KnowledgeGraph> for GraphSnapshot {
    fn from(graph: &KnowledgeGraph) -> Self {
        Self {
            nodes: graph.nodes().iter().map(SnapshotNode::from).collect(),
            edges: graph.edges().iter().map(SnapshotEdge::from).collect(),
        }
    }
}

impl From<KnowledgeGraph> for GraphSnapshot {
    fn from(graph: KnowledgeGraph) -> Self {
        Self::from(&graph)
    }
}

impl From<GraphSnapshot> for KnowledgeGraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut graph = KnowledgeGraph::new();
        for node in snapshot.nodes {
            graph.add_node(node.into());
        }

        let mut skipped = 0usize;
        for edge in snapshot.edges {
            if !graph.add_edge(edge.into()) {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, "Snapshot contained dangling or duplicate edges");
        }
        graph
    }
}

fn non_empty_or(value: String, fallback: String) -> String {
    if value.is_empty() { fallback } else { value }
}

// Stored snapshots may come from loosely typed writers. A mistyped display
// field falls back to its default instead of failing the whole load.

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let size = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if size.is_finite() && size > 0.0 {
        Ok(size.round().min(f64::from(u32::MAX)) as u32)
    } else {
        Ok(0)
    }
}

fn lenient_type<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + From<String>,
{
    let raw = lenient_string(deserializer)?;
    if raw.trim().is_empty() {
        Ok(T::default())
    } else {
        Ok(T::from(raw))
    }
}
