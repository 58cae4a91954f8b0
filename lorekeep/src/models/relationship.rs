//! Relationship types and extraction-time relationship records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::entity::{EntityType, Metadata, MetadataValue};
use crate::confidence::clamp_unit;

/// Kind of link between two entities.
///
/// `Custom` carries caller-defined semantics and is the only kind allowed to
/// connect an entity to itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationshipType {
    Uses,
    WorksOn,
    Has,
    /// Generic co-occurrence link
    RelatesTo,
    DependsOn,
    Creates,
    Custom(String),
}

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        match self {
            RelationshipType::Uses => "uses",
            RelationshipType::WorksOn => "worksOn",
            RelationshipType::Has => "has",
            RelationshipType::RelatesTo => "relatesTo",
            RelationshipType::DependsOn => "dependsOn",
            RelationshipType::Creates => "creates",
            RelationshipType::Custom(name) => name,
        }
    }

    /// Whether this is the generic co-occurrence type.
    pub fn is_generic(&self) -> bool {
        matches!(self, RelationshipType::RelatesTo)
    }

    pub fn allows_reflexive(&self) -> bool {
        matches!(self, RelationshipType::Custom(_))
    }

    /// Map a verb lemma onto a relationship type; unknown verbs fall back to `RelatesTo`.
    pub fn from_verb_lemma(lemma: &str) -> Self {
        match lemma.trim().to_lowercase().as_str() {
            "use" | "utilize" | "employ" => RelationshipType::Uses,
            "work" | "collaborate" => RelationshipType::WorksOn,
            "have" | "own" | "possess" => RelationshipType::Has,
            "depend" | "rely" => RelationshipType::DependsOn,
            "create" | "make" | "develop" | "build" => RelationshipType::Creates,
            _ => RelationshipType::RelatesTo,
        }
    }

    /// Whether an edge of this type may run from `source` to `target`.
    pub fn accepts(&self, source: EntityType, target: EntityType) -> bool {
        use EntityType::*;
        match self {
            RelationshipType::Uses => matches!(target, Technology | Resource | Concept | Project),
            RelationshipType::WorksOn => {
                matches!(source, Person | Organization)
                    && matches!(target, Project | Task | Technology | Concept)
            }
            RelationshipType::DependsOn => {
                let dependable = |t: EntityType| matches!(t, Technology | Project | Task | Resource | Concept);
                dependable(source) && dependable(target)
            }
            RelationshipType::Creates => {
                matches!(source, Person | Organization | Project | Technology)
            }
            RelationshipType::Has | RelationshipType::RelatesTo | RelationshipType::Custom(_) => {
                true
            }
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RelationshipType {
    fn from(value: String) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "uses" => RelationshipType::Uses,
            "workson" => RelationshipType::WorksOn,
            "has" => RelationshipType::Has,
            "relatesto" => RelationshipType::RelatesTo,
            "dependson" => RelationshipType::DependsOn,
            "creates" => RelationshipType::Creates,
            _ => RelationshipType::Custom(value),
        }
    }
}

impl From<RelationshipType> for String {
    fn from(value: RelationshipType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for RelationshipType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RelationshipType::from(s.to_string()))
    }
}

/// A directed link between two entities of the same collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Collection-scoped identifier; assigned by the collection when empty
    #[serde(default)]
    pub id: String,
    /// Source entity id
    pub source: String,
    /// Target entity id
    pub target: String,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    /// Extractor that proposed this relationship
    pub extractor: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Competing relationship types proposed for the same endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<RelationshipType>,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship_type: RelationshipType,
        confidence: f32,
        extractor: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            target: target.into(),
            relationship_type,
            confidence: clamp_unit(confidence),
            extractor: extractor.into(),
            metadata: Metadata::new(),
            conflicts_with: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn is_conflicted(&self) -> bool {
        !self.conflicts_with.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_lemma_table() {
        assert_eq!(RelationshipType::from_verb_lemma("use"), RelationshipType::Uses);
        assert_eq!(RelationshipType::from_verb_lemma("Employ"), RelationshipType::Uses);
        assert_eq!(RelationshipType::from_verb_lemma("collaborate"), RelationshipType::WorksOn);
        assert_eq!(RelationshipType::from_verb_lemma("rely"), RelationshipType::DependsOn);
        assert_eq!(RelationshipType::from_verb_lemma("build"), RelationshipType::Creates);
        assert_eq!(RelationshipType::from_verb_lemma("admire"), RelationshipType::RelatesTo);
    }

    #[test]
    fn test_wire_names_round_trip() {
        let json = serde_json::to_string(&RelationshipType::WorksOn).unwrap();
        assert_eq!(json, "\"worksOn\"");
        let parsed: RelationshipType = serde_json::from_str("\"works_on\"").unwrap();
        assert_eq!(parsed, RelationshipType::WorksOn);
        let custom: RelationshipType = serde_json::from_str("\"mentors\"").unwrap();
        assert_eq!(custom, RelationshipType::Custom("mentors".to_string()));
    }

    #[test]
    fn test_reflexivity_rules() {
        assert!(!RelationshipType::Uses.allows_reflexive());
        assert!(!RelationshipType::RelatesTo.allows_reflexive());
        assert!(RelationshipType::Custom("aliasOf".into()).allows_reflexive());
    }

    #[test]
    fn test_endpoint_compatibility() {
        use EntityType::*;
        assert!(RelationshipType::Uses.accepts(Person, Technology));
        assert!(!RelationshipType::Uses.accepts(Person, Person));
        assert!(RelationshipType::WorksOn.accepts(Organization, Project));
        assert!(!RelationshipType::WorksOn.accepts(Technology, Project));
        assert!(RelationshipType::RelatesTo.accepts(Task, Person));
    }
}
