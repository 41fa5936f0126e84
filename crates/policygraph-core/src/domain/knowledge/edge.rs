//! Graph edges and relation types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::Attributes;

/// A typed relation between two nodes
///
/// Edges are stored with a direction (the visualization convention) but every
/// traversal treats them as undirected.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    /// Printable label; defaults to the relation type name
    pub label: String,
    pub attributes: Attributes,
}

impl Edge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        let label = relation_type.as_str().to_string();
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            label,
            attributes: Attributes::new(),
        }
    }

    /// Override the printable label (empty labels are ignored)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !label.trim().is_empty() {
            self.label = label;
        }
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Uniqueness key within a graph
    pub fn key(&self) -> (String, String, RelationType) {
        (
            self.source_id.clone(),
            self.target_id.clone(),
            self.relation_type.clone(),
        )
    }

    /// Whether this edge touches the node
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    /// The endpoint opposite `node_id`, if the edge touches it
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_id == node_id {
            Some(&self.target_id)
        } else if self.target_id == node_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Types of relations between policy graph nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    /// Document or measure issued by an authority
    IssuedBy,
    /// Policy applies to a region, sector or subject
    AppliesTo,
    /// Cites another document
    References,
    /// Has an effect on
    Affects,
    /// Supersedes or repeals
    Replaces,
    /// Revises
    Amends,
    /// Generic association
    #[default]
    RelatesTo,
    /// Document mentions entity (created by ingestion)
    Contains,
    Other(String),
}

impl RelationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::IssuedBy => "issued_by",
            Self::AppliesTo => "applies_to",
            Self::References => "references",
            Self::Affects => "affects",
            Self::Replaces => "replaces",
            Self::Amends => "amends",
            Self::RelatesTo => "relates_to",
            Self::Contains => "contains",
            Self::Other(raw) => raw,
        }
    }

    /// Parse from raw extraction text; never fails
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "issued_by" | "issuedby" | "issued" | "issues" | "publishes" | "发布" | "印发"
            | "颁布" | "制定" => Self::IssuedBy,
            "applies_to" | "appliesto" | "适用" | "适用于" => Self::AppliesTo,
            "references" | "cites" | "引用" | "依据" => Self::References,
            "affects" | "impacts" | "影响" => Self::Affects,
            "replaces" | "supersedes" | "repeals" | "替代" | "废止" | "取代" => {
                Self::Replaces
            }
            "amends" | "revises" | "修订" | "修改" => Self::Amends,
            "relates_to" | "related_to" | "related" | "相关" | "关联" | "" => Self::RelatesTo,
            "contains" | "包含" => Self::Contains,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Known relation types
    pub fn all() -> &'static [RelationType] {
        &[
            Self::IssuedBy,
            Self::AppliesTo,
            Self::References,
            Self::Affects,
            Self::Replaces,
            Self::Amends,
            Self::RelatesTo,
            Self::Contains,
        ]
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<RelationType> for String {
    fn from(t: RelationType) -> Self {
        t.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_type_roundtrip() {
        for relation in RelationType::all() {
            assert_eq!(RelationType::parse(relation.as_str()), *relation);
        }
    }

    #[test]
    fn test_chinese_relation_text() {
        assert_eq!(RelationType::parse("发布"), RelationType::IssuedBy);
        assert_eq!(RelationType::parse("适用于"), RelationType::AppliesTo);
        assert_eq!(RelationType::parse("废止"), RelationType::Replaces);
        assert_eq!(RelationType::parse("批复"), RelationType::Other("批复".into()));
    }

    #[test]
    fn test_empty_relation_is_generic() {
        assert_eq!(RelationType::parse("  "), RelationType::RelatesTo);
    }

    #[test]
    fn test_edge_label_defaults_to_type() {
        let edge = Edge::new("a", "b", RelationType::Contains);
        assert_eq!(edge.label, "contains");

        let edge = Edge::new("a", "b", RelationType::parse("发布")).with_label("发布");
        assert_eq!(edge.label, "发布");
        assert_eq!(edge.relation_type, RelationType::IssuedBy);

        let edge = Edge::new("a", "b", RelationType::Affects).with_label(" ");
        assert_eq!(edge.label, "affects");
    }

    #[test]
    fn test_other_end() {
        let edge = Edge::new("a", "b", RelationType::References);
        assert_eq!(edge.other_end("a"), Some("b"));
        assert_eq!(edge.other_end("b"), Some("a"));
        assert_eq!(edge.other_end("c"), None);
        assert!(edge.touches("b"));
    }
}
