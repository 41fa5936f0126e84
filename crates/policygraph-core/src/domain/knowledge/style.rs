//! Visual hints for nodes and edges
//!
//! Both lookups are total: every node type and relation type, including the
//! `Other` arms, maps to a style.

use serde::{Deserialize, Serialize};

use super::edge::RelationType;
use super::node::NodeType;

/// Icon, size and color hint for rendering a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStyle {
    pub icon: String,
    pub size: u32,
    pub color: String,
}

impl NodeStyle {
    pub fn new(icon: impl Into<String>, size: u32, color: impl Into<String>) -> Self {
        Self {
            icon: icon.into(),
            size,
            color: color.into(),
        }
    }

    /// Default style for a node type
    pub fn for_type(node_type: &NodeType) -> Self {
        let (icon, size, color) = match node_type {
            NodeType::Policy => ("📄", 30, "#4A90E2"),
            NodeType::Authority => ("🏛", 25, "#E24A4A"),
            NodeType::Region => ("📍", 20, "#50C878"),
            NodeType::Concept => ("💡", 18, "#F5A623"),
            NodeType::Project => ("🏗", 22, "#9B59B6"),
            NodeType::Other(_) => ("●", 15, "#95A5A6"),
        };
        Self::new(icon, size, color)
    }
}

/// Edge color for a relation type
pub fn relation_color(relation_type: &RelationType) -> &'static str {
    match relation_type {
        RelationType::Contains => "#CCCCCC",
        RelationType::IssuedBy => "#E24A4A",
        RelationType::AppliesTo => "#50C878",
        RelationType::References => "#4A90E2",
        RelationType::Affects => "#F5A623",
        RelationType::Replaces => "#8E44AD",
        RelationType::Amends => "#16A085",
        RelationType::RelatesTo => "#7F8C8D",
        RelationType::Other(_) => "#95A5A6",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_types_get_default_style() {
        let style = NodeStyle::for_type(&NodeType::Other("资金".into()));
        assert_eq!(style, NodeStyle::for_type(&NodeType::Other("anything".into())));
        assert_eq!(style.size, 15);
    }

    #[test]
    fn test_documents_render_largest() {
        let policy = NodeStyle::for_type(&NodeType::Policy);
        for node_type in NodeType::all() {
            assert!(NodeStyle::for_type(node_type).size <= policy.size);
        }
    }

    #[test]
    fn test_relation_colors() {
        assert_eq!(relation_color(&RelationType::Contains), "#CCCCCC");
        assert_eq!(
            relation_color(&RelationType::Other("批复".into())),
            relation_color(&RelationType::Other("转发".into()))
        );
    }
}
