//! Extraction collaborator boundary
//!
//! Entity/relation extraction itself happens outside the core. Whatever
//! produces it, the result arrives as untrusted JSON of roughly the shape
//! `{entities: [{text, type, description}], relations: [{source, target, type}]}`
//! and is coerced here into [`RawExtraction`], counting what had to be skipped.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A document handed to ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Caller's identifier, stored on the document node as `document_id`
    pub document_id: String,
    pub title: String,
    /// Full text; only needed by extractors that read it
    pub text: String,
}

impl SourceDocument {
    pub fn new(
        document_id: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Produces the raw extraction result for one document
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, document: &SourceDocument) -> Result<Value>;
}

/// An entity mention as reported by extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntity {
    pub text: String,
    /// Raw type string; empty when missing
    pub entity_type: String,
    pub description: String,
}

/// A relation between two mentions as reported by extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelation {
    pub source: String,
    pub target: String,
    /// Raw relation text; empty when missing
    pub relation: String,
}

/// Extraction result after lenient coercion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExtraction {
    pub entities: Vec<RawEntity>,
    pub relations: Vec<RawRelation>,
    /// Entries (or whole sections) that could not be used
    pub malformed: usize,
}

impl RawExtraction {
    /// Coerce an untrusted value; never fails
    pub fn from_value(value: &Value) -> Self {
        let mut extraction = Self::default();

        let Some(object) = value.as_object() else {
            warn!("Extraction result is not a JSON object; treating as empty");
            extraction.malformed += 1;
            return extraction;
        };

        for entry in section(object, &["entities"], &mut extraction.malformed) {
            match parse_entity(entry) {
                Some(entity) => extraction.entities.push(entity),
                None => {
                    debug!(entry = %entry, "Skipping malformed entity");
                    extraction.malformed += 1;
                }
            }
        }

        for entry in section(
            object,
            &["relations", "relationships"],
            &mut extraction.malformed,
        ) {
            match parse_relation(entry) {
                Some(relation) => extraction.relations.push(relation),
                None => {
                    debug!(entry = %entry, "Skipping malformed relation");
                    extraction.malformed += 1;
                }
            }
        }

        if extraction.malformed > 0 {
            warn!(
                malformed = extraction.malformed,
                entities = extraction.entities.len(),
                relations = extraction.relations.len(),
                "Extraction result contained malformed entries"
            );
        }
        extraction
    }
}

/// The array under the first present key; missing or null means empty
fn section<'a>(object: &'a Map<String, Value>, keys: &[&str], malformed: &mut usize) -> &'a [Value] {
    let Some(value) = keys.iter().find_map(|key| object.get(*key)) else {
        return &[];
    };
    match value {
        Value::Array(items) => items.as_slice(),
        Value::Null => &[],
        _ => {
            *malformed += 1;
            &[]
        }
    }
}

fn parse_entity(entry: &Value) -> Option<RawEntity> {
    match entry {
        Value::String(text) if !text.trim().is_empty() => Some(RawEntity {
            text: text.trim().to_string(),
            entity_type: String::new(),
            description: String::new(),
        }),
        Value::Object(object) => Some(RawEntity {
            text: str_field(object, &["text", "name"])?,
            entity_type: str_field(object, &["type", "entity_type"]).unwrap_or_default(),
            description: str_field(object, &["description"]).unwrap_or_default(),
        }),
        _ => None,
    }
}

fn parse_relation(entry: &Value) -> Option<RawRelation> {
    let object = entry.as_object()?;
    Some(RawRelation {
        source: str_field(object, &["source", "from"])?,
        target: str_field(object, &["target", "to"])?,
        relation: str_field(object, &["type", "relation", "relation_type"]).unwrap_or_default(),
    })
}

/// First non-empty string under any of `keys`, trimmed
fn str_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key)?.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract JSON from a response that might contain markdown or other text
pub fn extract_json_from_response(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim();
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return &response[start..=end];
        }
    }

    response.trim()
}

/// One precomputed extraction result, as stored in an extraction file
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub extraction: Value,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for document_id, got {}",
            other
        ))),
    }
}

/// Serves extraction results computed ahead of time
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    results: HashMap<String, Value>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the result for a document id
    pub fn with_result(mut self, document_id: impl Into<String>, extraction: Value) -> Self {
        self.results.insert(document_id.into(), extraction);
        self
    }

    /// Build an extractor and the matching document list from records
    ///
    /// Records without an extraction are still returned as documents so the
    /// batch report shows them as skipped.
    pub fn from_records(records: Vec<ExtractionRecord>) -> (Self, Vec<SourceDocument>) {
        let mut extractor = Self::new();
        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            if !record.extraction.is_null() {
                extractor
                    .results
                    .insert(record.document_id.clone(), record.extraction);
            }
            documents.push(SourceDocument::new(
                record.document_id,
                record.title,
                record.text,
            ));
        }
        (extractor, documents)
    }

    /// Read records from a JSON file holding an array of [`ExtractionRecord`]
    pub fn load(path: &Path) -> Result<(Self, Vec<SourceDocument>)> {
        let contents = std::fs::read_to_string(path)?;
        let records: Vec<ExtractionRecord> = serde_json::from_str(&contents).map_err(|e| {
            Error::InvalidInput(format!(
                "{} is not a valid extraction file: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl DocumentExtractor for StaticExtractor {
    async fn extract(&self, document: &SourceDocument) -> Result<Value> {
        self.results
            .get(&document.document_id)
            .cloned()
            .ok_or_else(|| Error::ExtractionMissing(document.document_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_extraction() {
        let value = json!({
            "entities": [
                {"text": "专项债", "type": "concept", "description": "地方政府专项债券"},
                {"text": "财政部", "type": "authority"}
            ],
            "relations": [{"source": "财政部", "target": "专项债", "type": "发布"}]
        });
        let extraction = RawExtraction::from_value(&value);
        assert_eq!(extraction.entities.len(), 2);
        assert_eq!(extraction.entities[0].description, "地方政府专项债券");
        assert_eq!(extraction.relations[0].relation, "发布");
        assert_eq!(extraction.malformed, 0);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let extraction = RawExtraction::from_value(&json!({"entities": [{"text": "财政部"}]}));
        assert_eq!(extraction.entities.len(), 1);
        assert_eq!(extraction.entities[0].entity_type, "");
        assert!(extraction.relations.is_empty());
        assert_eq!(extraction.malformed, 0);

        let extraction = RawExtraction::from_value(&json!({}));
        assert_eq!(extraction, RawExtraction::default());
    }

    #[test]
    fn test_aliases_accepted() {
        let value = json!({
            "entities": [{"name": "国务院", "type": "authority"}, "交通运输部"],
            "relationships": [{"from": "国务院", "to": "交通运输部", "relation": "领导"}]
        });
        let extraction = RawExtraction::from_value(&value);
        assert_eq!(extraction.entities[0].text, "国务院");
        assert_eq!(extraction.entities[1].text, "交通运输部");
        assert_eq!(extraction.relations[0].relation, "领导");
    }

    #[test]
    fn test_malformed_entries_are_counted() {
        let value = json!({
            "entities": [{"type": "concept"}, 42, {"text": "  "}, {"text": "专项债"}],
            "relations": "oops"
        });
        let extraction = RawExtraction::from_value(&value);
        assert_eq!(extraction.entities.len(), 1);
        assert_eq!(extraction.malformed, 4);

        let extraction = RawExtraction::from_value(&json!(["not", "an", "object"]));
        assert_eq!(extraction.malformed, 1);
        assert!(extraction.entities.is_empty());
    }

    #[test]
    fn test_extract_json_from_response() {
        let fenced = "结果如下：\n```json\n{\"entities\": []}\n```\n以上。";
        assert_eq!(extract_json_from_response(fenced), "{\"entities\": []}");

        let generic = "```\n{\"relations\": []}\n```";
        assert_eq!(extract_json_from_response(generic), "{\"relations\": []}");

        let raw = "Here: {\"a\": {\"b\": 1}} done";
        assert_eq!(extract_json_from_response(raw), "{\"a\": {\"b\": 1}}");

        assert_eq!(extract_json_from_response("  nothing "), "nothing");
    }

    #[test]
    fn test_records_with_numeric_ids() {
        let records: Vec<ExtractionRecord> = serde_json::from_value(json!([
            {"document_id": 7, "title": "文件甲", "extraction": {"entities": []}},
            {"document_id": "b", "title": "文件乙"}
        ]))
        .unwrap();

        let (extractor, documents) = StaticExtractor::from_records(records);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].document_id, "7");
        assert_eq!(extractor.len(), 1);
    }

    #[tokio::test]
    async fn test_static_extractor_missing_result() {
        let extractor = StaticExtractor::new().with_result("a", json!({"entities": []}));

        let found = extractor
            .extract(&SourceDocument::new("a", "文件甲", ""))
            .await
            .unwrap();
        assert_eq!(found, json!({"entities": []}));

        let err = extractor
            .extract(&SourceDocument::new("b", "文件乙", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExtractionMissing(id) if id == "b"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extractions.json");
        std::fs::write(
            &path,
            r#"[{"document_id": "d1", "title": "文件甲", "extraction": {"entities": [{"text": "专项债"}]}}]"#,
        )
        .unwrap();

        let (extractor, documents) = StaticExtractor::load(&path).unwrap();
        assert_eq!(documents[0].title, "文件甲");
        assert!(!extractor.is_empty());

        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            StaticExtractor::load(&path),
            Err(Error::InvalidInput(_))
        ));
    }
}
