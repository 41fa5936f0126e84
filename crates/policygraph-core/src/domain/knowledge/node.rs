//! Graph nodes
//!
//! A node is either a policy document or an entity mentioned in one. Nodes
//! carry an open attribute map for back-references (`document_id`,
//! `policy_id`) and free-form metadata, plus a visual style hint consumed by
//! the visualization collaborator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::style::NodeStyle;

/// Open attribute map attached to nodes and edges
pub type Attributes = BTreeMap<String, Value>;

/// File suffixes that leak into document titles from upload filenames
const FILE_SUFFIXES: &[&str] = &[".pdf", ".docx", ".doc", ".wps", ".txt"];

/// A node in the policy knowledge graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier within a graph
    pub id: String,
    /// Display label
    pub label: String,
    /// Kind of node
    pub node_type: NodeType,
    /// Back-references and metadata
    pub attributes: Attributes,
    /// Visual hints
    pub style: NodeStyle,
}

impl Node {
    /// Create a node with the default style for its type
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: NodeType) -> Self {
        let style = NodeStyle::for_type(&node_type);
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            attributes: Attributes::new(),
            style,
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Override the visual style
    pub fn with_style(mut self, style: NodeStyle) -> Self {
        self.style = style;
        self
    }

    /// Read an attribute as a string (numbers are rendered)
    pub fn attribute_str(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The document this node stands for, if it is a policy document
    pub fn document_reference(&self) -> Option<String> {
        self.attribute_str("document_id")
            .or_else(|| self.attribute_str("policy_id"))
    }

    /// Normalize a label for duplicate detection
    ///
    /// Trims whitespace and strips trailing file suffixes (case-insensitive),
    /// repeatedly, so `"文件甲.pdf.docx "` becomes `"文件甲"`.
    pub fn normalize_label(label: &str) -> String {
        let mut current = label.trim();
        loop {
            let lower = current.to_ascii_lowercase();
            let stripped = FILE_SUFFIXES
                .iter()
                .find(|suffix| lower.ends_with(*suffix))
                .map(|suffix| current[..current.len() - suffix.len()].trim_end());

            match stripped {
                Some(next) if next.len() < current.len() => current = next,
                _ => break,
            }
        }
        current.to_string()
    }
}

/// Kinds of nodes in the policy graph
///
/// Unrecognized raw types from extraction are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// A policy document
    Policy,
    /// Issuing or responsible body (ministry, bureau, committee)
    Authority,
    /// Geographic or administrative region
    Region,
    /// Abstract concept or instrument (e.g. "专项债")
    Concept,
    /// Concrete project or program
    Project,
    Other(String),
}

impl NodeType {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Policy => "policy",
            Self::Authority => "authority",
            Self::Region => "region",
            Self::Concept => "concept",
            Self::Project => "project",
            Self::Other(raw) => raw,
        }
    }

    /// Parse from a raw extraction type; never fails
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "policy" | "document" | "policy_document" | "law" | "regulation" | "政策"
            | "文件" | "政策文件" | "法规" => Self::Policy,
            "authority" | "organization" | "organisation" | "agency" | "department"
            | "institution" | "机构" | "机关" | "部门" | "组织" => Self::Authority,
            "region" | "location" | "place" | "area" | "地区" | "区域" | "地点" => {
                Self::Region
            }
            "concept" | "term" | "topic" | "概念" | "术语" => Self::Concept,
            "project" | "program" | "programme" | "项目" => Self::Project,
            "" => Self::Other("unknown".to_string()),
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Known node types
    pub fn all() -> &'static [NodeType] {
        &[
            Self::Policy,
            Self::Authority,
            Self::Region,
            Self::Concept,
            Self::Project,
        ]
    }
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}
