//! Entity types and extraction-time entity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ModelError;
use crate::confidence::clamp_unit;

/// Metadata attached to entities, relationships and graph records.
///
/// A `BTreeMap` keeps serialization and equality independent of insertion order.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata key recording how many extractors proposed an entity.
pub const METHOD_AGREEMENT_KEY: &str = "method_agreement";

/// Metadata key listing the extractors that proposed an entity.
pub const EXTRACTORS_KEY: &str = "extractors";

/// Metadata key set by pattern-based extractors on known-pattern matches.
pub const PATTERN_MATCH_KEY: &str = "pattern_match";

/// Closed set of entity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    /// People (e.g., "Omar", "Dr. Jane Doe")
    Person,
    /// Companies, teams, institutions
    Organization,
    /// Languages, frameworks, tools
    Technology,
    /// Abstract ideas and topics
    Concept,
    /// Documents, links, datasets
    Resource,
    /// Units of work
    Task,
    /// Larger efforts grouping tasks
    Project,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: [EntityType; 7] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Technology,
        EntityType::Concept,
        EntityType::Resource,
        EntityType::Task,
        EntityType::Project,
    ];

    /// Get a string representation of the entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "Person",
            EntityType::Organization => "Organization",
            EntityType::Technology => "Technology",
            EntityType::Concept => "Concept",
            EntityType::Resource => "Resource",
            EntityType::Task => "Task",
            EntityType::Project => "Project",
        }
    }

    /// Property keys recognised for this type.
    ///
    /// Entity metadata under one of these keys is carried onto the graph node
    /// as a property when the entity is resolved.
    pub fn property_keys(&self) -> &'static [&'static str] {
        match self {
            EntityType::Person => &["role", "email"],
            EntityType::Organization => &["industry", "url"],
            EntityType::Technology => &["version", "category"],
            EntityType::Concept => &["definition"],
            EntityType::Resource => &["url", "format"],
            EntityType::Task => &["status", "deadline", "assignee"],
            EntityType::Project => &["status", "url"],
        }
    }

    /// Whether `key` is a recognised property key for this type.
    pub fn recognises(&self, key: &str) -> bool {
        self.property_keys().contains(&key)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownEntityType(s.to_string()))
    }
}

/// Permitted metadata value shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Timestamp(DateTime<Utc>),
    StringList(Vec<String>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetadataValue::StringList(items) => Some(items),
            _ => None,
        }
    }

    /// Whether two values assert the same fact.
    ///
    /// Strings compare case-insensitively after trimming; other shapes compare exactly.
    pub fn agrees_with(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (MetadataValue::String(a), MetadataValue::String(b)) => {
                a.trim().eq_ignore_ascii_case(b.trim())
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => f.write_str(s),
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            MetadataValue::StringList(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::StringList(value)
    }
}

/// Byte range into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Result<Self, ModelError> {
        if start > end {
            return Err(ModelError::InvalidSpan { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Number of bytes shared with `other`.
    pub fn overlap(&self, other: &Span) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Overlap measured against the longer of the two spans, in [0, 1].
    pub fn overlap_ratio(&self, other: &Span) -> f32 {
        let longer = self.len().max(other.len());
        if longer == 0 {
            return if self == other { 1.0 } else { 0.0 };
        }
        self.overlap(other) as f32 / longer as f32
    }

    /// Whether this span lies on char boundaries inside `text`.
    pub fn is_valid_for(&self, text: &str) -> bool {
        self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

/// A candidate mention found in one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Collection-scoped identifier; assigned by the collection when empty
    #[serde(default)]
    pub id: String,
    /// Surface form as it appears in the text
    pub name: String,
    pub entity_type: EntityType,
    pub span: Span,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
    /// Extractor whose proposal represents this entity
    pub extractor: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Entity {
    /// Create a new entity with a caller-supplied base confidence.
    ///
    /// The confidence is clamped to [0, 1]; an inverted span is rejected.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        start: usize,
        end: usize,
        confidence: f32,
        extractor: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            id: String::new(),
            name: name.into(),
            entity_type,
            span: Span::new(start, end)?,
            confidence: clamp_unit(confidence),
            extractor: extractor.into(),
            metadata: Metadata::new(),
        })
    }

    /// Add a metadata entry to this entity.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Extractors recorded as having proposed this entity.
    ///
    /// Falls back to the representing extractor when no merge has happened.
    pub fn contributors(&self) -> Vec<String> {
        match self.metadata.get(EXTRACTORS_KEY).and_then(|v| v.as_list()) {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => vec![self.extractor.clone()],
        }
    }

    /// Whether a pattern-based extractor matched this entity against a known form.
    pub fn is_pattern_match(&self) -> bool {
        self.metadata.contains_key(PATTERN_MATCH_KEY)
    }

    /// Property assertions carried in metadata, filtered to the keys the type recognises.
    pub fn asserted_properties(&self) -> Metadata {
        self.metadata
            .iter()
            .filter(|(key, _)| self.entity_type.recognises(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
