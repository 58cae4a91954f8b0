//! Persisted knowledge-graph records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::entity::{EntityType, Metadata};
use super::observation::ObservationLog;
use super::relationship::RelationshipType;

const NODE_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_7265_6b65_6570_6e6f_6465_0000_0001);
const EDGE_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_7265_6b65_6570_6564_6765_0000_0002);

/// Normalize a surface form for identity comparisons.
///
/// Trims, lowercases and collapses internal whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A persisted, identity-stable graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: Uuid,
    pub node_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Metadata,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Source ids that contributed evidence
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub observations: ObservationLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl KnowledgeNode {
    /// Create a node whose id derives from its type and normalized name.
    pub fn new(node_type: EntityType, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Self::deterministic_id(node_type, &name),
            node_type,
            name,
            aliases: Vec::new(),
            properties: Metadata::new(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
            sources: Vec::new(),
            observations: ObservationLog::new(),
            embedding: None,
        }
    }

    pub fn deterministic_id(node_type: EntityType, name: &str) -> Uuid {
        let key = format!("{}:{}", node_type.as_str(), normalize_name(name));
        Uuid::new_v5(&NODE_NAMESPACE, key.as_bytes())
    }

    /// Names this node answers to: its canonical name followed by its aliases.
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether `normalized` equals the canonical name.
    pub fn has_name(&self, normalized: &str) -> bool {
        normalize_name(&self.name) == normalized
    }

    /// Whether `normalized` equals one of the recorded aliases.
    pub fn has_alias(&self, normalized: &str) -> bool {
        self.aliases.iter().any(|a| normalize_name(a) == normalized)
    }

    /// Record an alias unless it duplicates the name or an existing alias.
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        let normalized = normalize_name(&alias);
        if normalized.is_empty() || self.has_name(&normalized) || self.has_alias(&normalized) {
            return false;
        }
        self.aliases.push(alias);
        true
    }

    pub fn add_source(&mut self, source: &str) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }
}

/// A persisted directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRelation {
    pub id: Uuid,
    pub source: Uuid,
    pub target: Uuid,
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Metadata,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub observations: ObservationLog,
}

impl KnowledgeRelation {
    pub fn new(source: Uuid, target: Uuid, relationship_type: RelationshipType) -> Self {
        let now = Utc::now();
        Self {
            id: Self::deterministic_id(source, &relationship_type, target),
            source,
            target,
            relationship_type,
            properties: Metadata::new(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
            observations: ObservationLog::new(),
        }
    }

    pub fn deterministic_id(source: Uuid, relationship_type: &RelationshipType, target: Uuid) -> Uuid {
        let key = format!("{}:{}:{}", source, relationship_type.as_str(), target);
        Uuid::new_v5(&EDGE_NAMESPACE, key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Omar   El\tMountassir "), "omar el mountassir");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_deterministic_ids_ignore_surface_variation() {
        let a = KnowledgeNode::deterministic_id(EntityType::Technology, "Python");
        let b = KnowledgeNode::deterministic_id(EntityType::Technology, " python ");
        let c = KnowledgeNode::deterministic_id(EntityType::Concept, "Python");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_alias_deduplication() {
        let mut node = KnowledgeNode::new(EntityType::Person, "Omar El Mountassir");
        assert!(node.add_alias("Omar"));
        assert!(!node.add_alias("omar"));
        assert!(!node.add_alias("omar el  mountassir"));
        assert_eq!(node.aliases, vec!["Omar".to_string()]);
        assert!(node.has_alias("omar"));
    }

    #[test]
    fn test_edge_id_depends_on_direction_and_type() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let forward = KnowledgeRelation::deterministic_id(a, &RelationshipType::Uses, b);
        assert_ne!(forward, KnowledgeRelation::deterministic_id(b, &RelationshipType::Uses, a));
        assert_ne!(forward, KnowledgeRelation::deterministic_id(a, &RelationshipType::Has, b));
    }
}
